//! # Event Bus
//!
//! Publish/subscribe abstraction shared by every pipeline worker and by the
//! outbox relay. Two implementations are provided:
//!
//! - [`InMemoryBus`]: synchronous fan-out to registered handlers on the
//!   publishing task. No persistence. Intended for tests and single-process
//!   deployments.
//! - [`KafkaBus`]: durable broker-backed bus. Each subscription is a named
//!   consumer group with manual offset commits, so a restarted worker resumes
//!   from the last acknowledged position.
//!
//! Delivery is **at-least-once**. Consumers convert it into an effectively-once
//! business effect with an idempotency guard keyed on [`Event::id`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use event_bus::{handler_fn, Event, EventBus, InMemoryBus};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(InMemoryBus::new());
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! bus.subscribe(
//!     "media.uploaded.v1",
//!     "worker-ingest",
//!     handler_fn(|event: Event| async move {
//!         println!("received {}", event.id);
//!         Ok(())
//!     }),
//!     shutdown_rx,
//! )
//! .await?;
//!
//! bus.publish(Event::new("evt-1", "media.uploaded.v1", b"{}".to_vec()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

mod error;
mod factory;
mod kafka;
mod memory;

pub use error::{BusError, BusResult};
pub use factory::{bus_from_config, bus_from_env};
pub use kafka::{synthetic_event_id, KafkaBus, KafkaBusConfig, EVENT_ID_HEADER};
pub use memory::InMemoryBus;

/// Immutable event envelope.
///
/// `id` is the deduplication key, `topic` the routing key. The payload is
/// opaque to the bus; pipeline workers treat it as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Event {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            payload,
        }
    }

    /// Serialize `body` as JSON into a new event with a fresh UUIDv4 ID.
    pub fn json<T: Serialize>(topic: impl Into<String>, body: &T) -> BusResult<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            payload: serde_json::to_vec(body)?,
        })
    }

    /// Decode the payload as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Consumer callback invoked for every delivered event.
///
/// Returning `Err` maps to a negative acknowledgement on the durable bus
/// (the broker redelivers) and aborts the current `publish` on the
/// in-process bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Explicit shutdown hook for anything holding a connection or pool.
///
/// Every store and bus declares this up front so service bootstrapping can
/// close resources without probing for capabilities at runtime.
#[async_trait]
pub trait ResourceCloser: Send + Sync {
    async fn close(&self) -> anyhow::Result<()>;
}

/// Publish/subscribe contract.
#[async_trait]
pub trait EventBus: ResourceCloser {
    /// Publish a single event to `event.topic`.
    async fn publish(&self, event: Event) -> BusResult<()>;

    /// Register `handler` for `topic` under the durable consumer name
    /// `consumer`. When `shutdown` flips to `true` the subscription drains:
    /// the in-flight handler call finishes and no new deliveries start.
    async fn subscribe(
        &self,
        topic: &str,
        consumer: &str,
        handler: Arc<dyn EventHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> BusResult<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Resolves once `rx` observes `true`. A dropped sender never signals.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
