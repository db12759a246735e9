use async_trait::async_trait;
use event_bus::{Event, EventBus};
use event_schema::{topics, MediaUploadedV1, VideoAssetReadyV1};
use idempotent_consumer::IdempotencyGuard;
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::{run_failed, step_completed};
use crate::run_tracker::{log_step, mark_run, RunStatus, RunTracker, StepStatus};
use crate::stage::{publish_contract, StageGate, StageProcessor};

pub const CONSUMER: &str = "worker-gen-qc";
pub const STEP: &str = "qc";
pub const QC_FAILED: &str = "generation_qc_failed";

/// Accepted duration, 30s to 30min inclusive.
pub const DURATION_BOUNDS_MS: RangeInclusive<i64> = 30_000..=1_800_000;

const FALLBACK_UPLOADER: &str = "admin-studio";
const QUEUED: &str = "qc checks passed and upload queued";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QcError {
    #[error("source_url must be absolute http(s) url")]
    InvalidSourceUrl,

    #[error("duration_ms outside qc bounds")]
    InvalidDuration,
}

pub fn qc_validate(asset: &VideoAssetReadyV1) -> Result<(), QcError> {
    let absolute_http = Url::parse(&asset.source_url)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false);
    if !absolute_http {
        return Err(QcError::InvalidSourceUrl);
    }
    if !DURATION_BOUNDS_MS.contains(&asset.duration_ms) {
        return Err(QcError::InvalidDuration);
    }
    Ok(())
}

/// Quality gate between generation and the content chain.
///
/// A passing asset re-enters the content chain as `media.uploaded.v1`.
pub struct GenQcProcessor {
    bus: Arc<dyn EventBus>,
    gate: StageGate,
    tracker: Arc<dyn RunTracker>,
}

impl GenQcProcessor {
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

    async fn reject(&self, asset: &VideoAssetReadyV1, reason: QcError) -> anyhow::Result<()> {
        let message = reason.to_string();
        warn!(
            worker = CONSUMER,
            run_id = %asset.run_id,
            asset_id = %asset.asset_id,
            error = %message,
            "QC rejected generated asset"
        );

        let tracker = self.tracker.as_ref();
        mark_run(tracker, &asset.run_id, RunStatus::Failed, &message).await;
        log_step(tracker, &asset.run_id, STEP, StepStatus::Failed, &message).await;

        publish_contract(
            self.bus.as_ref(),
            &run_failed(&asset.run_id, STEP, QC_FAILED, &message),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StageProcessor for GenQcProcessor {
    fn topic(&self) -> &'static str {
        topics::VIDEO_ASSET_READY
    }

    fn consumer(&self) -> &'static str {
        CONSUMER
    }

    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(incoming) = self.gate.admit::<VideoAssetReadyV1>(event).await? else {
            return Ok(());
        };

        if let Err(reason) = qc_validate(&incoming) {
            return self.reject(&incoming, reason).await;
        }

        let uploader_id = if incoming.uploader_id.is_empty() {
            FALLBACK_UPLOADER.to_string()
        } else {
            incoming.uploader_id.clone()
        };
        let uploaded = MediaUploadedV1 {
            asset_id: incoming.asset_id.clone(),
            source_url: incoming.source_url.clone(),
            uploader_id,
            trace_id: incoming.run_id.clone(),
        };
        publish_contract(self.bus.as_ref(), &uploaded).await?;
        publish_contract(
            self.bus.as_ref(),
            &step_completed(&incoming.run_id, STEP, QUEUED),
        )
        .await?;

        let tracker = self.tracker.as_ref();
        mark_run(tracker, &incoming.run_id, RunStatus::PublishQueued, "").await;
        log_step(tracker, &incoming.run_id, STEP, StepStatus::Completed, QUEUED).await;

        info!(
            worker = CONSUMER,
            run_id = %incoming.run_id,
            asset_id = %incoming.asset_id,
            "QC passed and media upload event emitted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_tracker::testing::RecordingTracker;
    use crate::test_support::capture;
    use event_bus::InMemoryBus;
    use event_schema::VideoRunFailedV1;

    fn asset(source_url: &str, duration_ms: i64) -> VideoAssetReadyV1 {
        VideoAssetReadyV1 {
            run_id: "run-1".to_string(),
            asset_id: "gen-asset-1".to_string(),
            source_url: source_url.to_string(),
            duration_ms,
            content_suitability: "kids".to_string(),
            age_band: "6-11".to_string(),
            uploader_id: String::new(),
            ready_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_duration_bounds() {
        let url = "https://host/a.mp4";
        assert_eq!(qc_validate(&asset(url, 29_999)), Err(QcError::InvalidDuration));
        assert_eq!(qc_validate(&asset(url, 30_000)), Ok(()));
        assert_eq!(qc_validate(&asset(url, 1_800_000)), Ok(()));
        assert_eq!(qc_validate(&asset(url, 1_800_001)), Err(QcError::InvalidDuration));
    }

    #[test]
    fn test_source_url_scheme() {
        assert_eq!(
            qc_validate(&asset("ftp://host/a.mp4", 60_000)),
            Err(QcError::InvalidSourceUrl)
        );
        assert_eq!(
            qc_validate(&asset("/relative/a.mp4", 60_000)),
            Err(QcError::InvalidSourceUrl)
        );
        assert_eq!(qc_validate(&asset("https://host/a.mp4", 60_000)), Ok(()));
        assert_eq!(qc_validate(&asset("http://host/a.mp4", 60_000)), Ok(()));
    }

    type Outcome = (Vec<MediaUploadedV1>, Vec<VideoRunFailedV1>, Arc<RecordingTracker>);

    /// Deliver the same asset event twice.
    async fn run(asset: &VideoAssetReadyV1, id: &str) -> Outcome {
        let bus = Arc::new(InMemoryBus::new());
        let uploaded = capture(bus.as_ref(), topics::MEDIA_UPLOADED).await;
        let failed = capture(bus.as_ref(), topics::VIDEO_RUN_FAILED).await;
        let tracker = Arc::new(RecordingTracker::default());
        let processor = GenQcProcessor::new(
            bus.clone(),
            Arc::new(IdempotencyGuard::in_memory()),
            tracker.clone(),
        );

        let event = Event::new(id, topics::VIDEO_ASSET_READY, serde_json::to_vec(asset).unwrap());
        processor.handle(&event).await.unwrap();
        processor.handle(&event).await.unwrap();
        (uploaded.decoded(), failed.decoded(), tracker)
    }

    #[tokio::test]
    async fn test_pass_reenters_content_chain_once() {
        let (uploaded, failed, tracker) = run(&asset("https://host/a.mp4", 60_000), "evt1").await;

        assert!(failed.is_empty());
        assert_eq!(
            uploaded,
            vec![MediaUploadedV1 {
                asset_id: "gen-asset-1".to_string(),
                source_url: "https://host/a.mp4".to_string(),
                uploader_id: "admin-studio".to_string(),
                trace_id: "run-1".to_string(),
            }]
        );
        assert_eq!(tracker.statuses()[0].1, RunStatus::PublishQueued);
    }

    #[tokio::test]
    async fn test_rejection_fails_the_run() {
        let (uploaded, failed, tracker) = run(&asset("ftp://host/a.mp4", 60_000), "evt2").await;

        assert!(uploaded.is_empty());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_code, "generation_qc_failed");
        assert_eq!(failed[0].error_message, "source_url must be absolute http(s) url");
        assert_eq!(
            tracker.statuses(),
            vec![(
                "run-1".to_string(),
                RunStatus::Failed,
                "source_url must be absolute http(s) url".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_uploader_is_carried_over() {
        let mut ready = asset("https://host/a.mp4", 60_000);
        ready.uploader_id = "creator-7".to_string();
        let (uploaded, _, _) = run(&ready, "evt3").await;
        assert_eq!(uploaded[0].uploader_id, "creator-7");
    }
}
