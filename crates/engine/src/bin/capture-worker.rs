//! capture-worker: polls the job registry and runs capture cycles.
//!
//! Reads jobs from the registry service at `BACKEND_URL`, queries each
//! enabled job's source for rows past its watermark, writes them as one
//! object per cycle and commits the new watermark back to the registry.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use delta_core::config::{self, Config};
use delta_core::SystemClock;
use delta_engine::PollingEngine;
use delta_registry::HttpRegistry;
use delta_source::SqlConnector;
use delta_storage::ObjectStoreSink;

// ── CLI ─────────────────────────────────────────────────────────────

/// Incremental capture worker.
#[derive(Parser, Debug)]
#[command(name = "capture-worker", version, about)]
struct Cli {
    /// Polling cadence in seconds (overrides POLL_JOBS_INTERVAL).
    #[arg(long)]
    interval: Option<u64>,

    /// Registry base URL (overrides BACKEND_URL).
    #[arg(long)]
    backend_url: Option<String>,

    /// Run a single tick, wait for its cycles, then exit.
    #[arg(long)]
    once: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(secs) = cli.interval {
        config.worker.poll_interval_secs = secs;
    }
    if let Some(url) = cli.backend_url {
        config.registry.backend_url = url;
    }
    config.validate()?;
    config.log_summary();

    let registry = Arc::new(HttpRegistry::new(
        &config.registry.backend_url,
        config.registry.timeout(),
    )?);
    let connector = Arc::new(SqlConnector::new(config.worker.source_connect_timeout()));
    let sink = Arc::new(ObjectStoreSink::new(config.storage.clone()));

    let engine = PollingEngine::new(
        registry,
        connector,
        sink,
        Arc::new(SystemClock),
        config.worker.page_size,
        config.worker.poll_interval(),
    );

    if cli.once {
        let report = engine.poll_once().await?;
        info!(failed = report.failed, "capture-worker single tick finished");
        return Ok(());
    }

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C");
            signal.notify_one();
        }
    });

    info!("capture-worker starting");
    engine.run(shutdown).await;
    info!("capture-worker exited cleanly");
    Ok(())
}
