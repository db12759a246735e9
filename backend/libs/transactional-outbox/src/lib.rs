//! # Transactional Outbox
//!
//! Durable staging area between a state change and its event publication.
//! Producers `add` an event as a pending row, ideally in the same database
//! transaction as the business write. A relay later drains due rows into the
//! event bus.
//!
//! Delivery is **at-least-once**:
//! - A successful publish marks the row `published`.
//! - A failed publish bumps `attempts`, records the error and schedules the
//!   row again after a fixed delay.
//! - On the attempt that reaches the limit the row becomes `failed` and a
//!   dead-letter record is published to `<topic>.dlq.v1`.
//!
//! Rows that end up `failed` can be inspected and requeued with the
//! `outbox-replay` binary (see [`ReplayStore`]).
//!
//! ## Usage Example
//!
//! ### 1. Insert data and event in same transaction
//!
//! ```rust,no_run
//! use event_bus::Event;
//! use sqlx::PgPool;
//! use transactional_outbox::SqlxOutboxStore;
//!
//! async fn approve(pool: &PgPool, outbox: &SqlxOutboxStore, asset_id: &str)
//!     -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let mut tx = pool.begin().await?;
//!
//!     sqlx::query("UPDATE media SET state = 'approved' WHERE asset_id = $1")
//!         .bind(asset_id)
//!         .execute(&mut *tx)
//!         .await?;
//!
//!     let event = Event::json(
//!         "media.approved.v1",
//!         &serde_json::json!({ "asset_id": asset_id }),
//!     )?;
//!     outbox.insert_in_tx(&mut tx, &event).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Start the relay
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use transactional_outbox::{
//!     relay_interval_from_env, OutboxRelay, PersistentOutbox, SqlxOutboxStore,
//! };
//!
//! # async fn run(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let bus = event_bus::bus_from_env()?;
//! let outbox = Arc::new(PersistentOutbox::new(Arc::new(SqlxOutboxStore::new(pool))));
//! let relay = OutboxRelay::new(outbox, bus, relay_interval_from_env());
//!
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! relay.run(shutdown_rx).await;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod metrics;
mod outbox;
mod postgres;
mod relay;
mod replay;
mod store;

pub use error::{OutboxError, OutboxResult};
pub use metrics::OutboxMetrics;
pub use outbox::{FlushReport, OutboxFlusher, OutboxSettings, PersistentOutbox};
pub use postgres::SqlxOutboxStore;
pub use relay::{
    relay_interval_from_env, relay_interval_from_lookup, OutboxRelay, DEFAULT_RELAY_INTERVAL,
};
pub use replay::{
    render_replay_result, FailedEvent, ReplayArgs, ReplayMode, ReplayOptions, ReplayStore,
};
pub use store::{InMemoryOutboxStore, OutboxRow, OutboxStatus, OutboxStore};
