use async_trait::async_trait;
use event_bus::{Event, EventBus};
use event_schema::{topics, VideoAssetReadyV1, VideoRunRequestedV1};
use idempotent_consumer::IdempotencyGuard;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{run_failed, step_completed, timestamp};
use crate::profiles::ModelProfileReader;
use crate::provider::{GenerateRequest, ProviderFactory};
use crate::run_tracker::{log_step, mark_run, RunStatus, RunTracker, StepStatus};
use crate::stage::{publish_contract, StageGate, StageProcessor};

pub const CONSUMER: &str = "worker-gen-nim";
pub const STEP: &str = "nim";

pub const PROFILE_ERROR: &str = "nim_profile_error";
pub const PROVIDER_ERROR: &str = "nim_provider_error";

const GENERATED: &str = "nim generation completed";

/// Generates the video for a requested run.
///
/// Profile and provider failures are business outcomes: the run is marked
/// failed, `video.run.failed.v1` is emitted and the delivery is acknowledged.
pub struct GenNimProcessor {
    bus: Arc<dyn EventBus>,
    gate: StageGate,
    profiles: Arc<dyn ModelProfileReader>,
    providers: Arc<dyn ProviderFactory>,
    tracker: Arc<dyn RunTracker>,
}

impl GenNimProcessor {
    pub fn new(
        bus: Arc<dyn EventBus>,
        guard: Arc<IdempotencyGuard>,
        profiles: Arc<dyn ModelProfileReader>,
        providers: Arc<dyn ProviderFactory>,
        tracker: Arc<dyn RunTracker>,
    ) -> Self {
        Self {
            bus,
            gate: StageGate::new(CONSUMER, guard),
            profiles,
            providers,
            tracker,
        }
    }

    async fn fail_run(&self, run_id: &str, code: &str, message: &str) {
        warn!(worker = CONSUMER, run_id = %run_id, error_code = code, error = %message, "Generation failed");

        let tracker = self.tracker.as_ref();
        mark_run(tracker, run_id, RunStatus::Failed, message).await;
        log_step(tracker, run_id, STEP, StepStatus::Failed, message).await;

        let failed = run_failed(run_id, STEP, code, message);
        if let Err(e) = publish_contract(self.bus.as_ref(), &failed).await {
            error!(worker = CONSUMER, run_id = %run_id, error = %e, "Failed to publish run failure");
        }
    }
}

#[async_trait]
impl StageProcessor for GenNimProcessor {
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
        let run_id = incoming.run_id.as_str();

        let profile = match self.profiles.get_profile(&incoming.model_profile_id).await {
            Ok(profile) => profile,
            Err(e) => {
                self.fail_run(run_id, PROFILE_ERROR, &e.to_string()).await;
                return Ok(());
            }
        };
        let provider = match self.providers.provider_for(&profile) {
            Ok(provider) => provider,
            Err(e) => {
                self.fail_run(run_id, PROVIDER_ERROR, &e.to_string()).await;
                return Ok(());
            }
        };
        let request = GenerateRequest {
            run_id: incoming.run_id.clone(),
            input_payload: incoming.input_payload.clone(),
        };
        let result = match provider.generate_video(&request).await {
            Ok(result) => result,
            Err(e) => {
                self.fail_run(run_id, PROVIDER_ERROR, &e.to_string()).await;
                return Ok(());
            }
        };

        let ready = VideoAssetReadyV1 {
            run_id: incoming.run_id.clone(),
            asset_id: result.asset_id.clone(),
            source_url: result.source_url,
            duration_ms: result.duration_ms,
            content_suitability: incoming.content_suitability.clone(),
            age_band: incoming.age_band.clone(),
            uploader_id: incoming.requested_by.clone(),
            ready_at: timestamp(),
        };
        publish_contract(self.bus.as_ref(), &ready).await?;
        publish_contract(self.bus.as_ref(), &step_completed(run_id, STEP, GENERATED)).await?;

        log_step(self.tracker.as_ref(), run_id, STEP, StepStatus::Completed, GENERATED).await;

        info!(worker = CONSUMER, run_id = %run_id, asset_id = %result.asset_id, "NIM generation completed");
        Ok(())
    }
}
