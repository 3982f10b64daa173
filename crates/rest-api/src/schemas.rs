//! Read-side query API over persisted schema records and the event log.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use hookforge_core::SchemaRecord;
use hookforge_queue::QueueCounts;
use hookforge_store::{Aggregates, StoredEvent, TimelineBucket};

use crate::errors::{api_error, ApiError};
use crate::ApiState;

/// Aggregate counters plus queue and disk figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub aggregates: Aggregates,
    pub queue_depth: u64,
    pub disk_bytes_by_section: HashMap<String, u64>,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineQuery {
    hours: Option<u32>,
    kind: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/schemas", get(list_kinds))
        .route("/schemas/{*kind}", get(get_schema))
        .route("/stats", get(stats))
        .route("/events", get(recent_events))
        .route("/timeline", get(timeline))
        .route("/queue/stats", get(queue_stats))
        .with_state(state)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

async fn list_kinds(State(st): State<ApiState>) -> ApiResult<Vec<String>> {
    st.store
        .list_kinds()
        .await
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

async fn get_schema(
    State(st): State<ApiState>,
    Path(kind): Path<String>,
) -> ApiResult<SchemaRecord> {
    match st.store.load(&kind).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(api_error(ApiError::NotFound(format!(
            "schema for kind {kind}"
        )))),
        Err(e) => Err(api_error(e.into())),
    }
}

async fn stats(State(st): State<ApiState>) -> ApiResult<StatsResponse> {
    let aggregates = st
        .event_log
        .aggregates()
        .map_err(|e| api_error(e.into()))?;
    let counts = st.queue.counts().await.map_err(|e| api_error(e.into()))?;
    let disk = st
        .store
        .counters()
        .await
        .map_err(|e| api_error(e.into()))?;

    Ok(Json(StatsResponse {
        aggregates,
        queue_depth: counts.depth(),
        disk_bytes_by_section: disk.bytes_by_section,
    }))
}

async fn recent_events(
    State(st): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Vec<StoredEvent>> {
    let limit = query.limit.unwrap_or(50).min(500);
    st.event_log
        .recent_events(limit, query.kind.as_deref())
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

async fn timeline(
    State(st): State<ApiState>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Vec<TimelineBucket>> {
    let hours = query.hours.unwrap_or(24).min(24 * 14);
    st.event_log
        .hourly_timeline(hours, query.kind.as_deref())
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

async fn queue_stats(State(st): State<ApiState>) -> ApiResult<QueueCounts> {
    st.queue
        .counts()
        .await
        .map(Json)
        .map_err(|e| api_error(e.into()))
}
