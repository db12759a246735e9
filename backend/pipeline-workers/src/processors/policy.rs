use async_trait::async_trait;
use event_bus::{Event, EventBus};
use event_schema::{topics, MediaTranscodedV1};
use idempotent_consumer::IdempotencyGuard;
use std::sync::Arc;
use tracing::info;

use crate::stage::{publish_contract, StageGate, StageProcessor};
use crate::transforms::build_policy_outputs;

pub const CONSUMER: &str = "worker-policy";

/// `media.transcoded.v1` -> `media.reviewed.v1` + `media.approved.v1`
pub struct PolicyProcessor {
    bus: Arc<dyn EventBus>,
    gate: StageGate,
}

impl PolicyProcessor {
    pub fn new(bus: Arc<dyn EventBus>, guard: Arc<IdempotencyGuard>) -> Self {
        Self {
            bus,
            gate: StageGate::new(CONSUMER, guard),
        }
    }
}

#[async_trait]
impl StageProcessor for PolicyProcessor {
    fn topic(&self) -> &'static str {
        topics::MEDIA_TRANSCODED
    }

    fn consumer(&self) -> &'static str {
        CONSUMER
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(incoming) = self.gate.admit::<MediaTranscodedV1>(event).await? else {
            return Ok(());
        };

        let (reviewed, approved) = build_policy_outputs(&incoming)?;
        publish_contract(self.bus.as_ref(), &reviewed).await?;
        publish_contract(self.bus.as_ref(), &approved).await?;

        info!(
            worker = CONSUMER,
            asset_id = %incoming.asset_id,
            policy_result = %reviewed.policy_result,
            "Event processed"
        );
        Ok(())
    }
}
