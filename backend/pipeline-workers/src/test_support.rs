use event_bus::{handler_fn, Event, EventBus};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Events captured by [`capture`], in delivery order.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<Event>>>);

impl Captured {
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

/// Subscribe a recording handler to `topic`.
pub async fn capture(bus: &dyn EventBus, topic: &str) -> Captured {
    let captured = Captured::default();
    let sink = captured.clone();
    let (_tx, rx) = watch::channel(false);
    bus.subscribe(
        topic,
        &format!("capture-{topic}"),
        handler_fn(move |event: Event| {
            let sink = sink.clone();
            async move {
                sink.0.lock().unwrap().push(event);
                Ok(())
            }
        }),
        rx,
    )
    .await
    .unwrap();
    captured
}

pub const RUN_REQUESTED: &[u8] = br#"{
    "run_id":"run-1","workflow_id":"wf-1","model_profile_id":"nim-default",
    "input_payload":{"prompt":"a fox learns colours"},
    "priority":"normal","content_suitability":"kids","age_band":"6-11",
    "requested_by":"admin-1","requested_at":"2026-01-01T00:00:00Z","trace_id":"trace-1"
}"#;
