//! HTTP surface: the read-side query API and the webhook ingest route.
//!
//! The ingest handler acknowledges as soon as the job is enqueued; the
//! pipeline's failures never surface synchronously.

use std::sync::Arc;

use axum::Router;

use hookforge_queue::JobQueue;
use hookforge_store::{EventLog, FsSchemaStore};

mod errors;
mod health;
mod ingest;
mod schemas;

pub use errors::{api_error, ApiError};
pub use ingest::IngestAck;
pub use schemas::StatsResponse;

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<FsSchemaStore>,
    pub event_log: Arc<EventLog>,
    pub queue: Arc<dyn JobQueue>,
}

pub fn router(state: ApiState) -> Router {
    let health = health::router(state.clone());
    let read_side = schemas::router(state.clone());
    let ingest = ingest::router(state);

    health.merge(read_side).merge(ingest)
}
