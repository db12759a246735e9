//! The common shape of every stage processor.

use async_trait::async_trait;
use event_bus::{Event, EventBus, EventHandler};
use event_schema::EventContract;
use idempotent_consumer::IdempotencyGuard;
use std::sync::Arc;
use tracing::info;

use crate::error::StageError;

/// A single topic-in, topic(s)-out unit of the pipeline.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Topic the processor subscribes to.
    fn topic(&self) -> &'static str;

    /// Durable consumer name, also the idempotency scope.
    fn consumer(&self) -> &'static str;

    /// `Err` only for delivery-level failures; the broker redelivers.
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

struct StageHandler(Arc<dyn StageProcessor>);

#[async_trait]
impl EventHandler for StageHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.0.handle(event).await
    }
}

/// Adapt a processor for [`EventBus::subscribe`].
pub fn stage_handler(processor: Arc<dyn StageProcessor>) -> Arc<dyn EventHandler> {
    Arc::new(StageHandler(processor))
}

/// Dedup, topic guard and decode, in that order.
pub struct StageGate {
    worker: &'static str,
    guard: Arc<IdempotencyGuard>,
}

impl StageGate {
    pub fn new(worker: &'static str, guard: Arc<IdempotencyGuard>) -> Self {
        Self { worker, guard }
    }

    pub fn guard(&self) -> &Arc<IdempotencyGuard> {
        &self.guard
    }

    /// `Ok(None)` for duplicates and mis-routed events, which are acknowledged
    /// without side effects. Decode and validation failures propagate.
    pub async fn admit<T: EventContract>(&self, event: &Event) -> Result<Option<T>, StageError> {
        if self.guard.seen(&event.id).await {
            info!(worker = self.worker, event_id = %event.id, "Duplicate event ignored");
            return Ok(None);
        }
        if event.topic != T::TOPIC {
            info!(worker = self.worker, topic = %event.topic, "Unexpected topic skipped");
            return Ok(None);
        }

        let incoming: T = event.decode().map_err(|source| StageError::Decode {
            topic: T::TOPIC,
            source,
        })?;
        incoming.validate()?;
        Ok(Some(incoming))
    }
}

/// Publish `body` on its contract topic under a fresh event ID.
pub async fn publish_contract<T: EventContract>(
    bus: &dyn EventBus,
    body: &T,
) -> Result<(), StageError> {
    let publish_err = |source| StageError::Publish {
        topic: T::TOPIC,
        source,
    };
    let event = Event::json(T::TOPIC, body).map_err(publish_err)?;
    bus.publish(event).await.map_err(publish_err)
}
