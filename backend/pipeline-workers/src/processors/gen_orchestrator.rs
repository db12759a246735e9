use async_trait::async_trait;
use event_bus::{Event, EventBus};
use event_schema::{topics, VideoRunRequestedV1};
use idempotent_consumer::IdempotencyGuard;
use std::sync::Arc;
use tracing::info;

use super::step_completed;
use crate::run_tracker::{log_step, mark_run, RunStatus, RunTracker, StepStatus};
use crate::stage::{publish_contract, StageGate, StageProcessor};

pub const CONSUMER: &str = "worker-gen-orchestrator";
pub const STEP: &str = "orchestrator";

const SCHEDULED: &str = "generation pipeline scheduled";

/// Marks a requested run as running.
pub struct GenOrchestratorProcessor {
    bus: Arc<dyn EventBus>,
    gate: StageGate,
    tracker: Arc<dyn RunTracker>,
}

impl GenOrchestratorProcessor {
    pub fn new(
        bus: Arc<dyn EventBus>,
        guard: Arc<IdempotencyGuard>,
        tracker: Arc<dyn RunTracker>,
    ) -> Self {
        Self {
            bus,
            gate: StageGate::new(CONSUMER, guard),
            tracker,
        }
    }
}

#[async_trait]
impl StageProcessor for GenOrchestratorProcessor {
    fn topic(&self) -> &'static str {
        topics::VIDEO_RUN_REQUESTED
    }

    fn consumer(&self) -> &'static str {
        CONSUMER
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(incoming) = self.gate.admit::<VideoRunRequestedV1>(event).await? else {
            return Ok(());
        };

        publish_contract(
            self.bus.as_ref(),
            &step_completed(&incoming.run_id, STEP, SCHEDULED),
        )
        .await?;

        let tracker = self.tracker.as_ref();
        mark_run(tracker, &incoming.run_id, RunStatus::Running, "").await;
        log_step(tracker, &incoming.run_id, STEP, StepStatus::Completed, SCHEDULED).await;

        info!(worker = CONSUMER, run_id = %incoming.run_id, "Run orchestrated");
        Ok(())
    }
}
