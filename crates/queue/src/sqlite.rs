//! SQLite-backed durable queue.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Notify;
use tracing::{debug, warn};

use hookforge_common::{now_ms, BackoffPolicy};
use hookforge_config::QueueConfig;

use crate::{
    FailOutcome, Job, JobQueue, QueueCounts, QueueError, QueueResult,
};

pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
    max_attempts: u32,
    backoff: BackoffPolicy,
    notify: Arc<Notify>,
}

impl SqliteJobQueue {
    pub fn new(path: impl AsRef<Path>, cfg: &QueueConfig) -> QueueResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn, cfg)
    }

    /// In-memory queue (for testing). Not durable, same semantics.
    pub fn in_memory(cfg: &QueueConfig) -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, cfg)
    }

    fn with_connection(
        conn: Connection,
        cfg: &QueueConfig,
    ) -> QueueResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                priority INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                headers TEXT NOT NULL,
                payload TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                not_before_ms INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                worker_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_claim
                ON jobs(state, priority DESC);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_attempts: cfg.max_attempts,
            backoff: BackoffPolicy::new(
                std::time::Duration::from_millis(cfg.backoff_delay_ms),
                std::time::Duration::from_secs(300),
                0.2,
            ),
            notify: Arc::new(Notify::new()),
        })
    }

    fn lock(&self) -> QueueResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Database("connection poisoned".into()))
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<bool> {
        let inserted = {
            let conn = self.lock()?;
            conn.execute(
                "INSERT OR IGNORE INTO jobs
                    (id, state, priority, attempts, headers, payload,
                     enqueued_at, updated_at, not_before_ms)
                 VALUES (?1, 'waiting', ?2, 0, ?3, ?4, ?5, ?5, 0)",
                params![
                    job.id,
                    job.priority,
                    serde_json::to_string(&job.headers)?,
                    serde_json::to_string(&job.payload)?,
                    job.enqueued_at.to_rfc3339(),
                ],
            )? > 0
        };

        if inserted {
            self.notify.notify_one();
        } else {
            debug!(job_id = %job.id, "duplicate enqueue ignored");
        }
        Ok(inserted)
    }

    async fn dequeue(&self, worker_id: &str) -> QueueResult<Option<Job>> {
        let conn = self.lock()?;
        let now = now_ms();

        // Promote delayed jobs whose backoff has elapsed.
        conn.execute(
            "UPDATE jobs SET state = 'waiting', updated_at = ?1
             WHERE state = 'delayed' AND not_before_ms <= ?2",
            params![Utc::now().to_rfc3339(), now],
        )?;

        let claimed = conn
            .query_row(
                "SELECT id, priority, attempts, headers, payload, enqueued_at
                 FROM jobs WHERE state = 'waiting'
                 ORDER BY priority DESC, rowid ASC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u8>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, priority, attempts, headers, payload, enqueued_at)) =
            claimed
        else {
            return Ok(None);
        };

        let attempt = attempts + 1;
        conn.execute(
            "UPDATE jobs SET state = 'active', attempts = ?2,
                worker_id = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, attempt, worker_id, Utc::now().to_rfc3339()],
        )?;

        Ok(Some(Job {
            id,
            headers: serde_json::from_str(&headers)?,
            payload: serde_json::from_str(&payload)?,
            priority,
            attempt,
            enqueued_at: chrono::DateTime::parse_from_rfc3339(&enqueued_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    async fn complete(&self, job_id: &str) -> QueueResult<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE jobs SET state = 'completed', updated_at = ?2
             WHERE id = ?1 AND state = 'active'",
            params![job_id, Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(QueueError::UnknownJob(job_id.to_string()));
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        permanent: bool,
    ) -> QueueResult<FailOutcome> {
        let conn = self.lock()?;
        let attempts: u32 = conn
            .query_row(
                "SELECT attempts FROM jobs WHERE id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;

        if permanent || attempts >= self.max_attempts {
            conn.execute(
                "UPDATE jobs SET state = 'failed', last_error = ?2,
                    updated_at = ?3
                 WHERE id = ?1",
                params![job_id, error, Utc::now().to_rfc3339()],
            )?;
            warn!(job_id = %job_id, attempts, error, "job moved to failed set");
            return Ok(FailOutcome::Failed);
        }

        let delay = self.backoff.delay_for(attempts);
        let delay_ms = delay.as_millis() as u64;
        conn.execute(
            "UPDATE jobs SET state = 'delayed', last_error = ?2,
                not_before_ms = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                job_id,
                error,
                now_ms() + delay_ms as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(job_id = %job_id, attempts, delay_ms, "job scheduled for retry");
        Ok(FailOutcome::Retried {
            delay_ms,
            attempt: attempts,
        })
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (state, n) = row?;
            match state.as_str() {
                "waiting" => counts.waiting = n,
                "active" => counts.active = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                "delayed" => counts.delayed = n,
                other => {
                    warn!(state = other, "unexpected job state in queue")
                }
            }
        }
        Ok(counts)
    }

    async fn recover_abandoned(&self) -> QueueResult<u64> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE jobs SET state = 'waiting', worker_id = NULL,
                updated_at = ?1
             WHERE state = 'active'",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(n as u64)
    }

    fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trait_tests;
    use serde_json::json;
    use std::collections::HashMap;

    fn cfg() -> QueueConfig {
        QueueConfig::default()
    }

    fn queue() -> SqliteJobQueue {
        SqliteJobQueue::in_memory(&cfg()).unwrap()
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

    #[tokio::test]
    async fn attempts_exhaust_into_failed_set() {
        let q = queue(); // max_attempts = 3
        q.enqueue(Job::new("j", HashMap::new(), json!({}), 5))
            .await
            .unwrap();

        for expected_attempt in 1..=3u32 {
            // Force the delayed job runnable again
            {
                let conn = q.lock().unwrap();
                conn.execute("UPDATE jobs SET not_before_ms = 0", [])
                    .unwrap();
            }
            let job = q.dequeue("w").await.unwrap().unwrap();
            assert_eq!(job.attempt, expected_attempt);
            let outcome = q.fail(&job.id, "still broken", false).await.unwrap();
            if expected_attempt < 3 {
                assert!(matches!(outcome, FailOutcome::Retried { .. }));
            } else {
                assert_eq!(outcome, FailOutcome::Failed);
            }
        }

        let counts = q.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.depth(), 0);
    }

    #[tokio::test]
    async fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let q = SqliteJobQueue::new(&path, &cfg()).unwrap();
            q.enqueue(Job::new(
                "persisted",
                HashMap::new(),
                json!({"keep": true}),
                7,
            ))
            .await
            .unwrap();
        }

        let q = SqliteJobQueue::new(&path, &cfg()).unwrap();
        let job = q.dequeue("w").await.unwrap().unwrap();
        assert_eq!(job.id, "persisted");
        assert_eq!(job.payload, json!({"keep": true}));
    }

    #[tokio::test]
    async fn payload_and_headers_round_trip() {
        let q = queue();
        let mut headers = HashMap::new();
        headers.insert("x-event-id".to_string(), "abc".to_string());
        let payload = json!({"nested": {"deep": [1, 2, 3]}});

        q.enqueue(Job::new("rt", headers.clone(), payload.clone(), 5))
            .await
            .unwrap();
        let job = q.dequeue("w").await.unwrap().unwrap();
        assert_eq!(job.headers, headers);
        assert_eq!(job.payload, payload);
        q.complete(&job.id).await.unwrap();
        assert_eq!(q.counts().await.unwrap().completed, 1);
    }
}
