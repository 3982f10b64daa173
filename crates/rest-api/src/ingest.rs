//! Webhook ingest.
//!
//! Decodes the JSON body, captures headers, computes the enqueue priority,
//! and acknowledges with `202 Accepted` as soon as the queue has the job.
//! An `x-event-id` header becomes the idempotency id; duplicate deliveries
//! with the same id are acknowledged but not re-enqueued.

use std::collections::HashMap;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use hookforge_classify::priority_for;
use hookforge_queue::Job;

use crate::errors::{api_error, ApiError};
use crate::ApiState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestAck {
    pub job_id: String,
    pub priority: u8,
    pub duplicate: bool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/webhook", post(ingest))
        .with_state(state)
}

async fn ingest(
    State(st): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<IngestAck>), (StatusCode, String)> {
    if !payload.is_object() {
        return Err(api_error(ApiError::BadRequest(
            "payload root must be a JSON object".into(),
        )));
    }

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let job_id = header_map
        .get("x-event-id")
        .cloned()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let priority = priority_for(&payload);

    let inserted = st
        .queue
        .enqueue(Job::new(
            job_id.clone(),
            header_map,
            payload,
            priority,
        ))
        .await
        .map_err(|e| api_error(e.into()))?;

    debug!(job_id = %job_id, priority, duplicate = !inserted, "payload accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAck {
            job_id,
            priority,
            duplicate: !inserted,
        }),
    ))
}
