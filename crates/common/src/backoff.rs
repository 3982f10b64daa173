//! Exponential backoff with jitter.
//!
//! Used by the job queue to schedule retries for failed jobs. Unlike an
//! in-process retry loop, the queue persists each job's attempt count and
//! computes the delay for a given attempt statelessly, so the policy here is
//! a pure function of the attempt number.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff policy.
///
/// The delay doubles per attempt (capped at `max`), with random jitter
/// applied to prevent thundering-herd retries when many jobs fail at once.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Delay for the first retry.
    pub initial: Duration,

    /// Cap on the exponential growth.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0), applied as a ±fraction of the delay.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(2000),
            max: Duration::from_secs(300),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Attempt 1 waits `initial`, attempt 2 waits `2 * initial`, and so on,
    /// capped at `max`. Jitter is applied to the returned value only.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let base = self
            .initial
            .saturating_mul(1u32 << shift)
            .min(self.max);

        if self.jitter > 0.0 {
            let factor =
                1.0 + rand::rng().random_range(-self.jitter..self.jitter);
            base.mul_f64(factor).max(Duration::from_millis(1))
        } else {
            base
        }
    }
}
