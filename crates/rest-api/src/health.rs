//! Liveness/readiness endpoint.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::ApiState;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    queue_reachable: bool,
    event_log_reachable: bool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz(
    State(st): State<ApiState>,
) -> (StatusCode, Json<Health>) {
    let queue_reachable = st.queue.counts().await.is_ok();
    let event_log_reachable = st.event_log.aggregates().is_ok();

    let healthy = queue_reachable && event_log_reachable;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(Health {
            status: if healthy { "ok" } else { "degraded" },
            queue_reachable,
            event_log_reachable,
        }),
    )
}
