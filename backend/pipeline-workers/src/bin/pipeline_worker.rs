//! Pipeline Worker - runs one stage processor against the event bus
//!
//! Environment variables:
//! - KAFKA_BROKERS: Kafka broker addresses (unset: in-process bus)
//! - KAFKA_CLIENT_ID: Kafka client ID (default: "media-pipeline")
//! - DATABASE_URL: PostgreSQL URL for idempotency keys, run tracking and model profiles
//! - PERSISTENCE_MODE / APP_ENV: strict persistence when "strict"/"required" or "prod"/"production"
//! - CATALOG_URL: catalog service base URL (publish worker only)
//! - NIM_BASE_URL, NIM_MODEL_ID, NIM_TIMEOUT_MS: static model profile (gen-nim without database)
//! - LOG_FORMAT: "json" for JSON log lines

use anyhow::Context;
use clap::Parser;
use pipeline_workers::logging::init_tracing;
use pipeline_workers::{WorkerConfig, WorkerKind, WorkerRuntime};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "pipeline-worker", about = "Run one media pipeline stage processor")]
struct Args {
    /// Stage processor to run
    #[arg(long, value_enum)]
    worker: WorkerKind,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let consumer = args.worker.consumer();
    info!(worker = consumer, "Starting pipeline worker");

    let config = WorkerConfig::from_env(consumer);
    let bus = event_bus::bus_from_env().context("Failed to create event bus")?;
    let runtime = WorkerRuntime::build(args.worker, &config, bus)
        .await
        .with_context(|| format!("Failed to start {consumer}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = runtime.run(shutdown_rx).await {
        error!(worker = consumer, error = %e, "Worker exited with error");
        return Err(e);
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
