//! In-memory queue backend.
//!
//! Same semantics as the SQLite backend minus durability; used by tests and
//! available for ephemeral deployments.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use hookforge_common::{now_ms, BackoffPolicy};
use hookforge_config::QueueConfig;

use crate::{
    FailOutcome, Job, JobQueue, QueueCounts, QueueError, QueueResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

struct Entry {
    job: Job,
    state: State,
    not_before_ms: i64,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    next_seq: u64,
}

pub struct MemJobQueue {
    inner: Mutex<Inner>,
    max_attempts: u32,
    backoff: BackoffPolicy,
    notify: Arc<Notify>,
}

impl MemJobQueue {
    pub fn new(cfg: &QueueConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_attempts: cfg.max_attempts,
            backoff: BackoffPolicy::new(
                std::time::Duration::from_millis(cfg.backoff_delay_ms),
                std::time::Duration::from_secs(300),
                0.2,
            ),
            notify: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> QueueResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| QueueError::Database("queue poisoned".into()))
    }
}

#[async_trait]
impl JobQueue for MemJobQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<bool> {
        let inserted = {
            let mut inner = self.lock()?;
            if inner.entries.iter().any(|e| e.job.id == job.id) {
                false
            } else {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.entries.push(Entry {
                    job,
                    state: State::Waiting,
                    not_before_ms: 0,
                    seq,
                });
                true
            }
        };
        if inserted {
            self.notify.notify_one();
        }
        Ok(inserted)
    }

    async fn dequeue(&self, _worker_id: &str) -> QueueResult<Option<Job>> {
        let mut inner = self.lock()?;
        let now = now_ms();

        for entry in inner.entries.iter_mut() {
            if entry.state == State::Delayed && entry.not_before_ms <= now {
                entry.state = State::Waiting;
            }
        }

        let best = inner
            .entries
            .iter_mut()
            .filter(|e| e.state == State::Waiting)
            .max_by(|a, b| {
                a.job
                    .priority
                    .cmp(&b.job.priority)
                    .then(b.seq.cmp(&a.seq))
            });

        match best {
            Some(entry) => {
                entry.state = State::Active;
                entry.job.attempt += 1;
                Ok(Some(entry.job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job_id: &str) -> QueueResult<()> {
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.job.id == job_id && e.state == State::Active)
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;
        entry.state = State::Completed;
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        _error: &str,
        permanent: bool,
    ) -> QueueResult<FailOutcome> {
        let max_attempts = self.max_attempts;
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.job.id == job_id)
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;

        let attempts = entry.job.attempt;
        if permanent || attempts >= max_attempts {
            entry.state = State::Failed;
            return Ok(FailOutcome::Failed);
        }

        let delay = self.backoff.delay_for(attempts);
        entry.state = State::Delayed;
        entry.not_before_ms = now_ms() + delay.as_millis() as i64;
        Ok(FailOutcome::Retried {
            delay_ms: delay.as_millis() as u64,
            attempt: attempts,
        })
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let inner = self.lock()?;
        let mut counts = QueueCounts::default();
        for entry in &inner.entries {
            match entry.state {
                State::Waiting => counts.waiting += 1,
                State::Active => counts.active += 1,
                State::Completed => counts.completed += 1,
                State::Failed => counts.failed += 1,
                State::Delayed => counts.delayed += 1,
            }
        }
        Ok(counts)
    }

    async fn recover_abandoned(&self) -> QueueResult<u64> {
        let mut inner = self.lock()?;
        let mut recovered = 0;
        for entry in inner.entries.iter_mut() {
            if entry.state == State::Active {
                entry.state = State::Waiting;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trait_tests;

    fn queue() -> MemJobQueue {
        MemJobQueue::new(&QueueConfig::default())
    }

    #[tokio::test]
    async fn fifo_within_priority_band() {
        trait_tests::exercise_fifo_and_priority(&queue()).await;
    }

    #[tokio::test]
    async fn duplicate_ids_are_no_ops() {
        trait_tests::exercise_idempotent_enqueue(&queue()).await;
    }

    #[tokio::test]
    async fn failed_attempts_back_off() {
        trait_tests::exercise_retry_then_fail(&queue()).await;
    }

    #[tokio::test]
    async fn permanent_failures_skip_retries() {
        trait_tests::exercise_permanent_failure(&queue()).await;
    }

    #[tokio::test]
    async fn abandoned_jobs_are_recovered() {
        trait_tests::exercise_recovery(&queue()).await;
    }
}
