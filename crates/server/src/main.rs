//! capture-server: registry HTTP service for capture jobs.
//!
//! Persists jobs in PostgreSQL when `PG_USERNAME` is set, otherwise
//! keeps them in memory for the lifetime of the process.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use delta_core::config::{self, Config};
use delta_server::{build_router, AppState};

/// Capture job registry service.
#[derive(Parser, Debug)]
#[command(name = "capture-server", version, about)]
struct Cli {
    /// Listen port (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Keep jobs in memory even when PostgreSQL is configured.
    #[arg(long)]
    in_memory: bool,
}

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
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    config.log_summary();

    let state = Arc::new(AppState::open(&config.postgres, cli.in_memory).await?);
    let app = build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C, shutting down");
            }
        })
        .await?;
    Ok(())
}
