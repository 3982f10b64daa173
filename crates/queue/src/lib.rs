//! Durable job queue.
//!
//! FIFO within a priority band, higher priority first. Jobs survive process
//! restart (SQLite backend), retry with exponential backoff, and land in a
//! retained failed set once attempts are exhausted. Enqueueing an
//! already-seen job id is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

mod mem;
mod sqlite;

pub use mem::MemJobQueue;
pub use sqlite::SqliteJobQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown job: {0}")]
    UnknownJob(String),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Database(e.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// One queued webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub headers: HashMap<String, String>,
    pub payload: serde_json::Value,
    pub priority: u8,
    /// Delivery attempts started so far, including the current one.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        headers: HashMap<String, String>,
        payload: serde_json::Value,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            headers,
            payload,
            priority,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Snapshot of queue occupancy for telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl QueueCounts {
    /// Jobs still owed processing.
    pub fn depth(&self) -> u64 {
        self.waiting + self.delayed
    }
}

/// What `fail` did with the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Scheduled for another attempt after the given delay.
    Retried { delay_ms: u64, attempt: u32 },
    /// Moved to the failed set, retained for inspection.
    Failed,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job. Returns `false` when the id was already seen (no-op).
    async fn enqueue(&self, job: Job) -> QueueResult<bool>;

    /// Claim the next job: highest priority first, FIFO within a band.
    /// Returns `None` when nothing is runnable.
    async fn dequeue(&self, worker_id: &str) -> QueueResult<Option<Job>>;

    /// Mark a job done.
    async fn complete(&self, job_id: &str) -> QueueResult<()>;

    /// Record a failed attempt; schedules a retry or moves the job to the
    /// failed set. `permanent` skips remaining retries.
    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        permanent: bool,
    ) -> QueueResult<FailOutcome>;

    async fn counts(&self) -> QueueResult<QueueCounts>;

    /// Return jobs abandoned mid-flight (e.g. by a crash) to the waiting
    /// state. Called once on startup.
    async fn recover_abandoned(&self) -> QueueResult<u64>;

    /// Wakes workers when a job is enqueued; polling remains the fallback.
    fn notifier(&self) -> Arc<Notify>;
}

#[cfg(test)]
mod trait_tests {
    //! Behavior shared by both backends.

    use super::*;
    use serde_json::json;

    pub(crate) async fn exercise_fifo_and_priority(queue: &dyn JobQueue) {
        queue
            .enqueue(Job::new("low-1", HashMap::new(), json!({"n": 1}), 3))
            .await
            .unwrap();
        queue
            .enqueue(Job::new("low-2", HashMap::new(), json!({"n": 2}), 3))
            .await
            .unwrap();
        queue
            .enqueue(Job::new("high", HashMap::new(), json!({"n": 3}), 12))
            .await
            .unwrap();

        let first = queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(first.id, "high");
        let second = queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(second.id, "low-1");
        let third = queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(third.id, "low-2");
        assert!(queue.dequeue("w1").await.unwrap().is_none());
    }

    pub(crate) async fn exercise_idempotent_enqueue(queue: &dyn JobQueue) {
        let job = Job::new("dup", HashMap::new(), json!({}), 5);
        assert!(queue.enqueue(job.clone()).await.unwrap());
        assert!(!queue.enqueue(job).await.unwrap());
        assert_eq!(queue.counts().await.unwrap().waiting, 1);
    }

    pub(crate) async fn exercise_retry_then_fail(queue: &dyn JobQueue) {
        queue
            .enqueue(Job::new("flaky", HashMap::new(), json!({}), 5))
            .await
            .unwrap();

        // Attempt 1 fails -> delayed
        let job = queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(job.attempt, 1);
        let outcome = queue.fail(&job.id, "boom", false).await.unwrap();
        assert!(matches!(outcome, FailOutcome::Retried { attempt: 1, .. }));
        assert_eq!(queue.counts().await.unwrap().delayed, 1);

        // Backoff has not elapsed yet
        assert!(queue.dequeue("w1").await.unwrap().is_none());
    }

    pub(crate) async fn exercise_permanent_failure(queue: &dyn JobQueue) {
        queue
            .enqueue(Job::new("bad", HashMap::new(), json!({}), 5))
            .await
            .unwrap();
        let job = queue.dequeue("w1").await.unwrap().unwrap();
        let outcome = queue.fail(&job.id, "malformed", true).await.unwrap();
        assert_eq!(outcome, FailOutcome::Failed);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.depth(), 0);
    }

    pub(crate) async fn exercise_recovery(queue: &dyn JobQueue) {
        queue
            .enqueue(Job::new("inflight", HashMap::new(), json!({}), 5))
            .await
            .unwrap();
        let _ = queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(queue.counts().await.unwrap().active, 1);

        let recovered = queue.recover_abandoned().await.unwrap();
        assert_eq!(recovered, 1);

        let again = queue.dequeue("w2").await.unwrap().unwrap();
        assert_eq!(again.id, "inflight");
        assert_eq!(again.attempt, 2);
    }
}
