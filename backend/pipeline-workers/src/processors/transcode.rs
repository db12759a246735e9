use async_trait::async_trait;
use event_bus::{Event, EventBus};
use event_schema::{topics, MediaTranscodeRequestedV1};
use idempotent_consumer::IdempotencyGuard;
use std::sync::Arc;
use tracing::info;

use crate::stage::{publish_contract, StageGate, StageProcessor};
use crate::transforms::build_transcoded_media;

pub const CONSUMER: &str = "worker-transcode";

/// `media.transcode.requested.v1` -> `media.transcoded.v1`
pub struct TranscodeProcessor {
    bus: Arc<dyn EventBus>,
    gate: StageGate,
}

impl TranscodeProcessor {
    pub fn new(bus: Arc<dyn EventBus>, guard: Arc<IdempotencyGuard>) -> Self {
        Self {
            bus,
            gate: StageGate::new(CONSUMER, guard),
        }
    }
}

#[async_trait]
impl StageProcessor for TranscodeProcessor {
    fn topic(&self) -> &'static str {
        topics::MEDIA_TRANSCODE_REQUESTED
    }

    fn consumer(&self) -> &'static str {
        CONSUMER
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(incoming) = self.gate.admit::<MediaTranscodeRequestedV1>(event).await? else {
            return Ok(());
        };

        let outgoing = build_transcoded_media(&incoming)?;
        publish_contract(self.bus.as_ref(), &outgoing).await?;

        info!(
            worker = CONSUMER,
            asset_id = %incoming.asset_id,
            renditions = outgoing.renditions.len(),
            "Event processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture;
    use event_bus::InMemoryBus;
    use event_schema::MediaTranscodedV1;

    #[tokio::test]
    async fn test_replayed_event_publishes_once() {
        let bus = Arc::new(InMemoryBus::new());
        let transcoded = capture(bus.as_ref(), topics::MEDIA_TRANSCODED).await;
        let processor =
            TranscodeProcessor::new(bus.clone(), Arc::new(IdempotencyGuard::in_memory()));

        let event = Event::new(
            "evt1",
            topics::MEDIA_TRANSCODE_REQUESTED,
            br#"{"asset_id":"asset-1","source_url":"https://cdn/a.mp4","trace_id":"trace-1"}"#
                .to_vec(),
        );
        processor.handle(&event).await.unwrap();
        processor.handle(&event).await.unwrap();

        let decoded: Vec<MediaTranscodedV1> = transcoded.decoded();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].renditions.len(), 2);
        assert!(decoded[0].duration_ms > 0);
    }
}
