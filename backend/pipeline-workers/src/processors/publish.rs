use async_trait::async_trait;
use event_bus::{Event, EventBus};
use event_schema::{topics, MediaApprovedV1};
use idempotent_consumer::IdempotencyGuard;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{CatalogProjector, EpisodeProjection};
use crate::stage::{publish_contract, StageGate, StageProcessor};
use crate::transforms::build_episode_published;

pub const CONSUMER: &str = "worker-publish";

/// `media.approved.v1` -> catalog projection + `episode.published.v1`
pub struct PublishProcessor {
    bus: Arc<dyn EventBus>,
    gate: StageGate,
    projector: Arc<dyn CatalogProjector>,
}

impl PublishProcessor {
    pub fn new(
        bus: Arc<dyn EventBus>,
        guard: Arc<IdempotencyGuard>,
        projector: Arc<dyn CatalogProjector>,
    ) -> Self {
        Self {
            bus,
            gate: StageGate::new(CONSUMER, guard),
            projector,
        }
    }
}

#[async_trait]
impl StageProcessor for PublishProcessor {
    fn topic(&self) -> &'static str {
        topics::MEDIA_APPROVED
    }

    fn consumer(&self) -> &'static str {
        CONSUMER
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(incoming) = self.gate.admit::<MediaApprovedV1>(event).await? else {
            return Ok(());
        };

        let outgoing = build_episode_published(&incoming)?;

        // Best-effort: the catalog can be re-projected from episode.published.v1.
        let projection = EpisodeProjection {
            episode_id: outgoing.episode_id.clone(),
            age_band: outgoing.age_band.clone(),
            learning_tags: outgoing.learning_tags.clone(),
            playback_ready: true,
        };
        if let Err(e) = self.projector.project_episode(&projection).await {
            warn!(
                worker = CONSUMER,
                episode_id = %outgoing.episode_id,
                error = %e,
                "Catalog projection failed"
            );
        }

        publish_contract(self.bus.as_ref(), &outgoing).await?;

        info!(
            worker = CONSUMER,
            asset_id = %incoming.asset_id,
            episode_id = %outgoing.episode_id,
            "Event processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NoopCatalogProjector;
    use crate::error::ProjectionError;
    use crate::test_support::capture;
    use event_bus::InMemoryBus;
    use event_schema::EpisodePublishedV1;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FailingProjector {
        calls: Mutex<Vec<EpisodeProjection>>,
    }

    #[async_trait]
    impl CatalogProjector for FailingProjector {
        async fn project_episode(
            &self,
            episode: &EpisodeProjection,
        ) -> Result<(), ProjectionError> {
            self.calls.lock().unwrap().push(episode.clone());
            Err(ProjectionError::Status(503))
        }
    }

    fn approved(id: &str) -> Event {
        Event::new(
            id,
            topics::MEDIA_APPROVED,
            br#"{"asset_id":"asset-123","age_band":"6-11","learning_tags":["farben"]}"#.to_vec(),
        )
    }

    #[tokio::test]
    async fn test_replayed_event_publishes_once() {
        let bus = Arc::new(InMemoryBus::new());
        let published = capture(bus.as_ref(), topics::EPISODE_PUBLISHED).await;
        let processor = PublishProcessor::new(
            bus.clone(),
            Arc::new(IdempotencyGuard::in_memory()),
            Arc::new(NoopCatalogProjector),
        );

        processor.handle(&approved("evt1")).await.unwrap();
        processor.handle(&approved("evt1")).await.unwrap();

        let decoded: Vec<EpisodePublishedV1> = published.decoded();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].episode_id, "ep-asset123");
        assert_eq!(decoded[0].learning_tags, vec!["farben"]);
    }

    #[tokio::test]
    async fn test_projection_failure_still_publishes() {
        let bus = Arc::new(InMemoryBus::new());
        let published = capture(bus.as_ref(), topics::EPISODE_PUBLISHED).await;
        let projector = Arc::new(FailingProjector::default());
        let processor = PublishProcessor::new(
            bus.clone(),
            Arc::new(IdempotencyGuard::in_memory()),
            projector.clone(),
        );

        processor.handle(&approved("evt2")).await.unwrap();

        assert_eq!(published.len(), 1);
        let calls = projector.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].playback_ready);
        assert_eq!(calls[0].episode_id, "ep-asset123");
    }
}
