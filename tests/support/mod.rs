//! Shared wiring for chain tests: every processor on one in-process bus.

#![allow(dead_code)]

use event_bus::{handler_fn, Event, EventBus, InMemoryBus};
use idempotent_consumer::IdempotencyGuard;
use pipeline_workers::stage::{stage_handler, StageProcessor};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Events seen on one topic, in delivery order.
#[derive(Clone, Default)]
pub struct Sink(Arc<Mutex<Vec<Event>>>);

impl Sink {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn decoded<T: serde::de::DeserializeOwned>(&self) -> Vec<T> {
        self.events().iter().map(|e| e.decode().unwrap()).collect()
    }
}

pub struct Harness {
    pub bus: Arc<InMemoryBus>,
    _shutdown: watch::Sender<bool>,
    shutdown: watch::Receiver<bool>,
}

impl Harness {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            bus: Arc::new(InMemoryBus::new()),
            _shutdown: tx,
            shutdown: rx,
        }
    }

    pub fn dyn_bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    pub fn guard() -> Arc<IdempotencyGuard> {
        Arc::new(IdempotencyGuard::in_memory())
    }

    pub async fn mount(&self, processor: Arc<dyn StageProcessor>) {
        self.bus
            .subscribe(
                processor.topic(),
                processor.consumer(),
                stage_handler(processor),
                self.shutdown.clone(),
            )
            .await
            .unwrap();
    }

    pub async fn sink(&self, topic: &str) -> Sink {
        let sink = Sink::default();
        let recorder = sink.clone();
        self.bus
            .subscribe(
                topic,
                &format!("sink-{topic}"),
                handler_fn(move |event: Event| {
                    let recorder = recorder.clone();
                    async move {
                        recorder.0.lock().unwrap().push(event);
                        Ok(())
                    }
                }),
                self.shutdown.clone(),
            )
            .await
            .unwrap();
        sink
    }

    pub async fn publish(&self, id: &str, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        self.bus
            .publish(Event::new(id, topic, payload.to_vec()))
            .await?;
        Ok(())
    }
}
