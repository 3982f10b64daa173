//! The worker pool: the asynchronous path between "a payload has been
//! accepted" and "the persistent schema record for its kind is consistent
//! with this payload".
//!
//! Each worker task pulls one job at a time: redact, classify, analyze,
//! then — under the kind's writer lock — load prior state, merge, detect
//! drift via the structure fingerprint, regenerate artifacts only when the
//! structure actually changed, persist, and append the event row. Workers
//! for distinct kinds never contend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hookforge_classify::Classifier;
use hookforge_codegen::{generate, metadata_json};
use hookforge_core::{
    payload_fingerprint, short_id, similarity, structure_fingerprint,
    EventRow, SchemaRecord, tree::PERSISTED_EXAMPLE_CAP,
};
use hookforge_queue::{FailOutcome, Job, JobQueue};
use hookforge_redact::Truncator;
use hookforge_sensing::{analyze, describe_differences, diff, merge};
use hookforge_store::{EventLog, FsSchemaStore, StoreError};

/// Idle poll interval when the queue is empty; enqueue notifications wake
/// workers earlier.
const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ProcessError {
    /// Non-object roots are rejected at ingress; any leakage here is
    /// permanent and goes straight to the failed set.
    #[error("payload root is not a JSON object")]
    MalformedPayload,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProcessError::MalformedPayload)
    }
}

/// What one processed job did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub kind: String,
    pub version: u64,
    pub total_received: u64,
    /// The merge left the structure fingerprint unchanged; artifacts were
    /// not regenerated.
    pub structure_unchanged: bool,
    pub redacted_fields: usize,
}

/// Explicit collaborators, wired at startup. No hidden state.
pub struct PipelineDeps {
    pub store: Arc<FsSchemaStore>,
    pub event_log: Arc<EventLog>,
    pub queue: Arc<dyn JobQueue>,
    pub truncator: Truncator,
    pub classifier: Classifier,
    /// Per-node example cap honored while merging; the persisted record
    /// keeps at most [`PERSISTED_EXAMPLE_CAP`].
    pub merge_example_cap: usize,
}

pub struct WorkerPool {
    deps: Arc<PipelineDeps>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        deps: Arc<PipelineDeps>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            deps,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Spawn the worker tasks. They run until the cancellation token fires,
    /// finishing their in-flight job first.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        (0..self.concurrency)
            .map(|i| {
                let deps = self.deps.clone();
                let cancel = self.cancel.clone();
                let worker_id = format!("worker-{i}");
                tokio::spawn(async move {
                    worker_loop(worker_id, deps, cancel).await;
                })
            })
            .collect()
    }

    /// Signal drain and wait for in-flight jobs up to `grace`. Jobs still
    /// running at the deadline are abandoned; queue durability retries them
    /// after restart.
    pub async fn drain(
        self,
        handles: Vec<JoinHandle<()>>,
        grace: Duration,
    ) {
        self.cancel.cancel();
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "drain deadline expired; abandoning in-flight jobs"
            );
        } else {
            info!("worker pool drained");
        }
    }
}

async fn worker_loop(
    worker_id: String,
    deps: Arc<PipelineDeps>,
    cancel: CancellationToken,
) {
    let notify = deps.queue.notifier();
    debug!(worker = %worker_id, "worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let job = match deps.queue.dequeue(&worker_id).await {
            Ok(job) => job,
            Err(e) => {
                error!(worker = %worker_id, error = %e, "dequeue failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(IDLE_POLL) => continue,
                }
            }
        };

        let Some(job) = job else {
            publish_depth(&deps).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = notify.notified() => {}
                _ = tokio::time::sleep(IDLE_POLL) => {}
            }
            continue;
        };

        handle_job(&worker_id, &deps, job).await;
    }

    debug!(worker = %worker_id, "worker stopped");
}

async fn handle_job(worker_id: &str, deps: &PipelineDeps, job: Job) {
    let job_id = job.id.clone();
    match process_job(deps, &job).await {
        Ok(summary) => {
            if let Err(e) = deps.queue.complete(&job_id).await {
                error!(worker = %worker_id, job_id = %job_id, error = %e,
                    "completed job could not be acknowledged");
            }
            debug!(
                worker = %worker_id,
                job_id = %job_id,
                kind = %summary.kind,
                version = summary.version,
                unchanged = summary.structure_unchanged,
                "job processed"
            );
        }
        Err(e) => {
            let permanent = e.is_permanent();
            warn!(
                worker = %worker_id,
                job_id = %job_id,
                error = %e,
                permanent,
                "job failed"
            );
            match deps.queue.fail(&job_id, &e.to_string(), permanent).await {
                Ok(FailOutcome::Retried { attempt, delay_ms }) => {
                    counter!("hookforge_jobs_retried_total").increment(1);
                    debug!(job_id = %job_id, attempt, delay_ms, "retry scheduled");
                }
                Ok(FailOutcome::Failed) => {
                    counter!("hookforge_jobs_failed_total").increment(1);
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "failure could not be recorded");
                }
            }
        }
    }
}

async fn publish_depth(deps: &PipelineDeps) {
    if let Ok(counts) = deps.queue.counts().await {
        gauge!("hookforge_queue_depth").set(counts.depth() as f64);
    }
}

/// Run one job through the full pipeline.
pub async fn process_job(
    deps: &PipelineDeps,
    job: &Job,
) -> Result<ProcessSummary, ProcessError> {
    let started = Instant::now();
    let received_at = job.enqueued_at;

    if !job.payload.is_object() {
        return Err(ProcessError::MalformedPayload);
    }

    let size_original = job.payload.to_string().len() as u64;
    histogram!("hookforge_payload_bytes").record(size_original as f64);

    // Redact first; classify on the untouched original.
    let (redacted, report) = deps.truncator.redact(&job.payload);
    let kind = deps.classifier.classify(&job.payload, &job.headers);
    let new_tree = analyze(&redacted, &report);

    let size_redacted = redacted.to_string().len() as u64;
    if !report.is_empty() {
        counter!("hookforge_redacted_fields_total")
            .increment(report.len() as u64);
    }

    // Everything from load to save happens under the kind's writer lock.
    let lock = deps.store.kind_lock(&kind);
    let _guard = lock.lock().await;

    let now = Utc::now();
    let prior = deps.store.load(&kind).await?;

    let (record, structure_unchanged) = match prior {
        Some(mut record) => {
            let merged =
                merge(&record.saved_tree, &new_tree, deps.merge_example_cap);
            let fingerprint = structure_fingerprint(&merged);
            let unchanged = fingerprint == record.structure_fingerprint;

            record.record_observation(now);

            if unchanged {
                // Counters only: artifacts stay byte-identical on disk.
                deps.store.save_metadata(&kind, &record).await?;
                deps.store
                    .archive_sample(&kind, &job.payload)
                    .await
                    .unwrap_or_else(|e| {
                        counter!("hookforge_raw_sample_errors_total")
                            .increment(1);
                        warn!(kind = %kind, error = %e, "raw sample skipped");
                    });
            } else {
                let changes = describe_differences(&diff(
                    &record.saved_tree,
                    &merged,
                ));
                let description = format!(
                    "{changes} (similarity {:.2})",
                    similarity(&record.structure_fingerprint, &fingerprint)
                );
                let mut tree = merged;
                tree.cap_examples(PERSISTED_EXAMPLE_CAP);
                record.apply_merged_tree(
                    tree,
                    fingerprint,
                    description,
                    now,
                );
                persist_with_artifacts(deps, &kind, &record, &job.payload)
                    .await?;
                counter!("hookforge_schema_versions_total",
                    "kind" => kind.clone())
                .increment(1);
                info!(
                    kind = %kind,
                    version = record.version,
                    fingerprint = %short_id(&record.structure_fingerprint, 12),
                    "schema evolved"
                );
            }
            (record, unchanged)
        }
        None => {
            let mut tree = new_tree;
            tree.cap_examples(PERSISTED_EXAMPLE_CAP);
            let record = SchemaRecord::new(kind.clone(), tree, now);
            persist_with_artifacts(deps, &kind, &record, &job.payload)
                .await?;
            counter!("hookforge_new_kinds_total").increment(1);
            info!(kind = %kind, "new kind persisted");
            (record, false)
        }
    };

    deps.event_log.upsert_schema(&record)?;

    let processed_at = Utc::now();
    deps.event_log.append_event(&EventRow {
        kind: kind.clone(),
        payload_fingerprint: payload_fingerprint(&job.payload),
        size_original,
        size_redacted,
        redacted_field_count: report.len() as u64,
        received_at,
        processed_at,
        processing_duration_ms: started.elapsed().as_millis() as u64,
    })?;

    counter!("hookforge_events_total", "kind" => kind.clone()).increment(1);
    histogram!("hookforge_processing_seconds")
        .record(started.elapsed().as_secs_f64());

    Ok(ProcessSummary {
        kind,
        version: record.version,
        total_received: record.total_received,
        structure_unchanged,
        redacted_fields: report.len(),
    })
}

/// Generate artifacts and write the full per-kind set.
async fn persist_with_artifacts(
    deps: &PipelineDeps,
    kind: &str,
    record: &SchemaRecord,
    raw_payload: &serde_json::Value,
) -> Result<(), ProcessError> {
    let artifacts = generate(kind, &record.saved_tree);
    if artifacts.degraded {
        counter!("hookforge_generator_fallbacks_total").increment(1);
    }

    // Metadata emission is exercised here so a serialization problem
    // surfaces before any file is touched.
    let _ = metadata_json(record)
        .map_err(|e| StoreError::Database(e.to_string()))?;

    deps.store
        .save(
            kind,
            record,
            &artifacts.validator,
            &artifacts.interface,
            &artifacts.examples_json,
            Some(raw_payload),
        )
        .await?;
    Ok(())
}
