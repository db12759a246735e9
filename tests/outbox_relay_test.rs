//! Outbox relay against the in-memory store and bus.

mod support;

use event_bus::{handler_fn, Event, EventBus};
use event_schema::{dead_letter_topic, topics, DeadLetterV1};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::Harness;
use tokio::sync::watch;
use transactional_outbox::{
    InMemoryOutboxStore, OutboxRelay, OutboxSettings, OutboxStatus, PersistentOutbox,
};

const PAYLOAD: &[u8] = br#"{"asset_id":"asset-123","source_url":"https://cdn/a.mp4","uploader_id":"u","trace_id":"t"}"#;

fn outbox(store: Arc<InMemoryOutboxStore>) -> Arc<PersistentOutbox> {
    Arc::new(PersistentOutbox::new(store).with_settings(OutboxSettings {
        retry_delay: Duration::ZERO,
        ..OutboxSettings::default()
    }))
}

#[tokio::test]
async fn test_relay_delivers_and_stops_on_shutdown() {
    let harness = Harness::new();
    let delivered = harness.sink(topics::MEDIA_UPLOADED).await;
    let store = Arc::new(InMemoryOutboxStore::new());
    let outbox = outbox(store.clone());
    outbox
        .add(&Event::new("evt-1", topics::MEDIA_UPLOADED, PAYLOAD.to_vec()))
        .await
        .unwrap();

    let relay = OutboxRelay::new(outbox, harness.dyn_bus(), Duration::from_millis(10));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { relay.run(rx).await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while delivered.len() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("relay should deliver the pending row");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("relay should stop after shutdown")
        .unwrap();

    assert_eq!(delivered.events()[0].id, "evt-1");
    assert_eq!(delivered.events()[0].payload, PAYLOAD.to_vec());
    let row = store.find("evt-1").unwrap();
    assert_eq!(row.status, OutboxStatus::Published);
    assert!(row.published_at.is_some());
}

#[tokio::test]
async fn test_add_twice_keeps_one_row() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let outbox = outbox(store.clone());
    let event = Event::new("evt-1", topics::MEDIA_UPLOADED, PAYLOAD.to_vec());

    outbox.add(&event).await.unwrap();
    outbox.add(&event).await.unwrap();

    assert_eq!(store.rows().len(), 1);
}

#[tokio::test]
async fn test_rejected_row_is_dead_lettered_after_max_attempts() {
    let harness = Harness::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    harness
        .bus
        .subscribe(
            topics::MEDIA_UPLOADED,
            "worker-rejecting",
            handler_fn(move |_event: Event| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("consumer unavailable")
                }
            }),
            watch::channel(false).1,
        )
        .await
        .unwrap();
    let dlq = harness.sink(&dead_letter_topic(topics::MEDIA_UPLOADED)).await;

    let store = Arc::new(InMemoryOutboxStore::new());
    let outbox = outbox(store.clone());
    outbox
        .add(&Event::new("evt-1", topics::MEDIA_UPLOADED, PAYLOAD.to_vec()))
        .await
        .unwrap();
    let relay = OutboxRelay::new(outbox, harness.dyn_bus(), Duration::from_millis(10));

    for _ in 0..9 {
        let report = relay.flush_once().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(dlq.len(), 0);
    }
    let report = relay.flush_once().await.unwrap();
    assert_eq!(report.dead_lettered, 1);

    let row = store.find("evt-1").unwrap();
    assert_eq!(row.status, OutboxStatus::Failed);
    assert_eq!(row.attempts, 10);
    assert!(row
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("consumer unavailable"));

    let letters = dlq.decoded::<DeadLetterV1>();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].event_id, "evt-1");
    assert_eq!(letters[0].original_topic, topics::MEDIA_UPLOADED);
    assert_eq!(letters[0].attempts, 10);
    assert_eq!(letters[0].payload["asset_id"], json!("asset-123"));

    // Failed rows are no longer due.
    assert!(relay.flush_once().await.unwrap().is_empty());
    assert_eq!(attempts.load(Ordering::SeqCst), 10);
}
