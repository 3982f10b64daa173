use axum::{Router, routing::get};
use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpListener;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone, Debug)]
pub struct Config {
    pub enable: bool,
    pub http_listener: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable: true,
            http_listener: Some(([0, 0, 0, 0], 9100).into()),
        }
    }
}

pub fn init(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if !cfg.enable {
        return Ok(());
    }

    if HANDLE.get().is_none() {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("failed to install recorder");
        HANDLE.set(handle).ok();
    }

    if let Some(addr) = cfg.http_listener {
        tokio::spawn(async move {
            let router = Router::new().route("/metrics", get(metrics_handler));
            // Retry binding a few times in case of startup races (tests)
            let mut tries = 0;
            loop {
                match TcpListener::bind(addr).await {
                    Ok(l) => {
                        axum::serve(l, router).await.ok();
                        break;
                    }
                    Err(e) if tries < 5 => {
                        tries += 1;
                        tracing::warn!(error=%e, tries, "metrics listener bind failed; retrying");
                        tokio::time::sleep(Duration::from_millis(150)).await;
                    }
                    Err(e) => {
                        tracing::error!(error=%e, "metrics listener failed; giving up");
                        break;
                    }
                }
            }
        });
    }

    describe_metrics();

    Ok(())
}

/// Axum handler that renders the current metrics snapshot.
pub async fn metrics_handler() -> String {
    HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# recorder not installed\n".into())
}

pub fn router_with_metrics() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub fn describe_metrics() {
    describe_counter!(
        "hookforge_events_total",
        Unit::Count,
        "Webhook events processed, labelled by kind"
    );
    describe_counter!(
        "hookforge_schema_versions_total",
        Unit::Count,
        "Schema version bumps (structural drift observed)"
    );
    describe_counter!(
        "hookforge_new_kinds_total",
        Unit::Count,
        "First-time event kinds persisted"
    );
    describe_counter!(
        "hookforge_redacted_fields_total",
        Unit::Count,
        "String fields redacted by the truncator"
    );
    describe_counter!(
        "hookforge_generator_fallbacks_total",
        Unit::Count,
        "Artifact generations that fell back to a degraded form"
    );
    describe_counter!(
        "hookforge_jobs_failed_total",
        Unit::Count,
        "Jobs moved to the failed set after exhausting retries"
    );
    describe_counter!(
        "hookforge_jobs_retried_total",
        Unit::Count,
        "Job attempts that failed and were scheduled for retry"
    );
    describe_counter!(
        "hookforge_raw_sample_errors_total",
        Unit::Count,
        "Raw-sample archive writes that failed (non-fatal)"
    );
    describe_counter!(
        "hookforge_panics_total",
        Unit::Count,
        "Panics captured by the panic hook"
    );
    describe_gauge!(
        "hookforge_queue_depth",
        Unit::Count,
        "Jobs waiting or delayed in the queue"
    );
    describe_gauge!(
        "hookforge_kinds_total",
        Unit::Count,
        "Distinct event kinds with a persisted schema"
    );
    describe_histogram!(
        "hookforge_processing_seconds",
        Unit::Seconds,
        "End-to-end processing latency per job"
    );
    describe_histogram!(
        "hookforge_payload_bytes",
        Unit::Bytes,
        "Distribution of original payload sizes"
    );
}
