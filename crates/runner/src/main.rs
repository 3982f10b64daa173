use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hookforge_classify::Classifier;
use hookforge_config::{apply_env_overrides, load_from_path, AppConfig};
use hookforge_queue::{JobQueue, SqliteJobQueue};
use hookforge_redact::Truncator;
use hookforge_rest_api::{router, ApiState};
use hookforge_store::{EventLog, FsSchemaStore};
use hookforge_worker::{PipelineDeps, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "hookforge", about = "Webhook schema inference service")]
struct Args {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the API bind address from the config.
    #[arg(long)]
    api_addr: Option<String>,

    /// Prometheus metrics bind address.
    #[arg(long, default_value = "0.0.0.0:9100")]
    metrics_addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => load_from_path(path)?,
        None => {
            let mut cfg = AppConfig::default();
            apply_env_overrides(&mut cfg);
            cfg
        }
    };
    if let Some(addr) = args.api_addr {
        cfg.api_addr = addr;
    }

    let metrics_addr: SocketAddr = args
        .metrics_addr
        .parse()
        .context("metrics_addr must be host:port")?;
    let o11y_cfg = hookforge_o11y::O11yConfig {
        logging: hookforge_o11y::logging::Config {
            level: None,
            json: false,
            with_targets: false,
        },
        metrics: hookforge_o11y::hf_metrics::Config {
            enable: true,
            http_listener: Some(metrics_addr),
        },
        install_panic_hook: true,
    };
    let _ = hookforge_o11y::init_all(&o11y_cfg);

    run(cfg).await
}

async fn run(cfg: AppConfig) -> Result<()> {
    if let Some(parent) = cfg.event_db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    if let Some(parent) = cfg.queue_db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let store = Arc::new(
        FsSchemaStore::new(&cfg.data_dir, cfg.samples.max_raw_samples)
            .await
            .context("open schema store")?,
    );
    let event_log = Arc::new(
        EventLog::new(&cfg.event_db_path).context("open event log")?,
    );
    let queue: Arc<dyn JobQueue> = Arc::new(
        SqliteJobQueue::new(&cfg.queue_db_path, &cfg.queue)
            .context("open job queue")?,
    );

    // Jobs abandoned by a previous process retry after restart.
    let recovered = queue.recover_abandoned().await?;
    if recovered > 0 {
        info!(recovered, "requeued jobs abandoned by previous run");
    }

    let deps = Arc::new(PipelineDeps {
        store: store.clone(),
        event_log: event_log.clone(),
        queue: queue.clone(),
        truncator: Truncator::new(&cfg.truncate),
        classifier: Classifier::new(cfg.vendor.clone()),
        merge_example_cap: cfg.samples.max_examples_per_schema,
    });

    let cancel = CancellationToken::new();
    let pool =
        WorkerPool::new(deps, cfg.queue.concurrency, cancel.clone());
    let handles = pool.spawn();
    info!(workers = cfg.queue.concurrency, "worker pool started");

    let app: Router = router(ApiState {
        store,
        event_log,
        queue,
    });
    let addr: SocketAddr =
        cfg.api_addr.parse().context("api_addr must be host:port")?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "api listening");

    let shutdown = cancel.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown.cancel();
        },
    );
    server.await.context("api server")?;

    pool.drain(handles, Duration::from_secs(cfg.shutdown_grace_secs))
        .await;
    info!("shutdown complete");
    Ok(())
}
