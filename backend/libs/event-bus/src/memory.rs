//! In-process bus for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::{BusError, BusResult, Event, EventBus, EventHandler, ResourceCloser};

/// Synchronous fan-out bus.
///
/// `publish` invokes every handler registered for the topic, in registration
/// order, on the publishing task. The first handler error is returned
/// immediately and the remaining handlers for that publish are skipped.
/// Consumer names and shutdown signals are accepted but unused.
#[derive(Default)]
pub struct InMemoryBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers currently registered for `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: Event) -> BusResult<()> {
        // Snapshot so no lock is held while handlers run (they may publish).
        let handlers = {
            let registry = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            registry.get(&event.topic).cloned().unwrap_or_default()
        };

        debug!(
            event_id = %event.id,
            topic = %event.topic,
            handlers = handlers.len(),
            "Dispatching event in-process"
        );

        for handler in handlers {
            handler.handle(&event).await.map_err(BusError::Handler)?;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        consumer: &str,
        handler: Arc<dyn EventHandler>,
        _shutdown: watch::Receiver<bool>,
    ) -> BusResult<()> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(handler);

        debug!(topic = %topic, consumer = %consumer, "In-process subscription registered");
        Ok(())
    }
}

#[async_trait]
impl ResourceCloser for InMemoryBus {
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
