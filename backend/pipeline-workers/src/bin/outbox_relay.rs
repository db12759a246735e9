//! Outbox Relay - drains `events.outbox` into the event bus
//!
//! Environment variables:
//! - DATABASE_URL: PostgreSQL URL holding the outbox table (required)
//! - KAFKA_BROKERS: Kafka broker addresses (unset: in-process bus)
//! - OUTBOX_RELAY_INTERVAL_MS: flush interval (default: 1000)
//! - LOG_FORMAT: "json" for JSON log lines

use anyhow::Context;
use db_pool::DbConfig;
use event_bus::ResourceCloser;
use pipeline_workers::logging::init_tracing;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use transactional_outbox::{
    relay_interval_from_env, OutboxMetrics, OutboxRelay, PersistentOutbox, SqlxOutboxStore,
};

const SERVICE: &str = "worker-outbox-relay";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let db_config = DbConfig::from_env(SERVICE)
        .context("DATABASE_URL is required for worker-outbox-relay")?;
    db_config.log_config();
    let pool = db_pool::create_pool(db_config)
        .await
        .context("Failed to connect to outbox database")?;
    db_pool::migrate(&pool)
        .await
        .context("Failed to apply database migrations")?;

    let mut outbox = PersistentOutbox::new(Arc::new(SqlxOutboxStore::new(pool)));
    match OutboxMetrics::new(SERVICE) {
        Ok(metrics) => outbox = outbox.with_metrics(metrics),
        Err(e) => warn!(error = %e, "Outbox metrics unavailable"),
    }
    let outbox = Arc::new(outbox);

    let bus = event_bus::bus_from_env().context("Failed to create event bus")?;
    let relay = OutboxRelay::new(outbox.clone(), bus.clone(), relay_interval_from_env());
    info!(worker = SERVICE, "Worker started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    relay.run(shutdown_rx).await;

    if let Err(e) = bus.close().await {
        error!(error = %e, "Failed to close event bus");
    }
    if let Err(e) = outbox.close().await {
        error!(error = %e, "Failed to close outbox store");
    }
    Ok(())
}
