//! Titanic API - serves a pre-trained survival classifier over HTTP
//!
//! Every prediction is appended to a SQLite log; the latest entries are
//! available at GET /logs.
//!
//! Module structure:
//! - `domain/` - Passenger features, log rows, model interface
//! - `io/` - External interfaces (SQLite store, HTTP transport, Prometheus)
//! - `services/` - Prediction handler
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use titanic_api::infra::{Config, Metrics};
use titanic_api::io::{http, ApiState};
use titanic_api::services::PredictionHandler;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Titanic API - survival prediction service with a prediction log
#[derive(Parser, Debug)]
#[command(name = "titanic-api", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-request logs
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), "titanic-api starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        model_path = %config.model_path(),
        store_path = %config.store_path(),
        metrics_enabled = %config.metrics_enabled(),
        "config_loaded"
    );

    // A missing model aborts startup before the socket is bound
    let metrics = Arc::new(Metrics::new());
    let handler = PredictionHandler::initialize(&config, metrics)
        .await
        .context("Initialization failed")?;

    let addr = config.listen_addr()?;
    let listener = http::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let state = ApiState::new(Arc::new(handler), config.metrics_enabled());
    http::serve(listener, state, shutdown_rx).await?;

    info!("titanic-api shutdown complete");
    Ok(())
}
