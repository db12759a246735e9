use async_trait::async_trait;
use event_bus::{Event, EventBus};
use event_schema::{topics, MediaUploadedV1};
use idempotent_consumer::IdempotencyGuard;
use std::sync::Arc;
use tracing::info;

use crate::stage::{publish_contract, StageGate, StageProcessor};
use crate::transforms::build_transcode_request;

pub const CONSUMER: &str = "worker-ingest";

/// `media.uploaded.v1` -> `media.transcode.requested.v1`
pub struct IngestProcessor {
    bus: Arc<dyn EventBus>,
    gate: StageGate,
}

impl IngestProcessor {
    pub fn new(bus: Arc<dyn EventBus>, guard: Arc<IdempotencyGuard>) -> Self {
        Self {
            bus,
            gate: StageGate::new(CONSUMER, guard),
        }
    }
}

#[async_trait]
impl StageProcessor for IngestProcessor {
    fn topic(&self) -> &'static str {
        topics::MEDIA_UPLOADED
    }

    fn consumer(&self) -> &'static str {
        CONSUMER
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(incoming) = self.gate.admit::<MediaUploadedV1>(event).await? else {
            return Ok(());
        };

        let outgoing = build_transcode_request(&incoming)?;
        publish_contract(self.bus.as_ref(), &outgoing).await?;

        info!(worker = CONSUMER, asset_id = %incoming.asset_id, "Event processed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture;
    use event_bus::InMemoryBus;
    use event_schema::MediaTranscodeRequestedV1;

    fn uploaded(id: &str) -> Event {
        Event::new(
            id,
            topics::MEDIA_UPLOADED,
            br#"{"asset_id":"asset-1","source_url":"https://cdn/a.mp4","uploader_id":"u-1","trace_id":"trace-1"}"#.to_vec(),
        )
    }

    #[tokio::test]
    async fn test_replayed_event_publishes_once() {
        let bus = Arc::new(InMemoryBus::new());
        let requests = capture(bus.as_ref(), topics::MEDIA_TRANSCODE_REQUESTED).await;
        let processor = IngestProcessor::new(bus.clone(), Arc::new(IdempotencyGuard::in_memory()));

        processor.handle(&uploaded("evt1")).await.unwrap();
        processor.handle(&uploaded("evt1")).await.unwrap();

        let decoded: Vec<MediaTranscodeRequestedV1> = requests.decoded();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].asset_id, "asset-1");
        assert_eq!(decoded[0].trace_id, "trace-1");
    }

    #[tokio::test]
    async fn test_incomplete_upload_is_rejected() {
        let bus = Arc::new(InMemoryBus::new());
        let requests = capture(bus.as_ref(), topics::MEDIA_TRANSCODE_REQUESTED).await;
        let processor = IngestProcessor::new(bus.clone(), Arc::new(IdempotencyGuard::in_memory()));

        let event = Event::new("evt2", topics::MEDIA_UPLOADED, br#"{"asset_id":"asset-1"}"#.to_vec());
        assert!(processor.handle(&event).await.is_err());
        assert_eq!(requests.len(), 0);
    }
}
