//! Generative-video chain: a run request through QC and back into the
//! content chain, with the NIM service mocked over HTTP.

mod support;

use async_trait::async_trait;
use event_bus::ResourceCloser;
use event_schema::{
    topics, EpisodePublishedV1, MediaUploadedV1, VideoAssetReadyV1, VideoRunFailedV1,
    VideoRunStepCompletedV1,
};
use pipeline_workers::catalog::NoopCatalogProjector;
use pipeline_workers::processors::{
    gen_nim, gen_qc, GenNimProcessor, GenOrchestratorProcessor, GenQcProcessor, IngestProcessor,
    PolicyProcessor, PublishProcessor, TranscodeProcessor,
};
use pipeline_workers::profiles::{ModelProfile, ModelProfileReader, StaticModelProfileReader};
use pipeline_workers::provider::DefaultProviderFactory;
use pipeline_workers::run_tracker::{RunStatus, RunTracker, StepStatus};
use pipeline_workers::{ProfileError, TrackerError};
use serde_json::json;
use std::sync::{Arc, Mutex};
use support::Harness;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RUN_REQUESTED: &[u8] = br#"{
    "run_id":"run-1","workflow_id":"wf-1","model_profile_id":"nim-default",
    "input_payload":{"prompt":"a fox learns colours"},
    "priority":"normal","content_suitability":"kids","age_band":"6-11",
    "requested_by":"admin-1","requested_at":"2026-01-01T00:00:00Z","trace_id":"trace-1"
}"#;

#[derive(Default)]
struct Tracker {
    statuses: Mutex<Vec<(String, RunStatus)>>,
    steps: Mutex<Vec<(String, StepStatus)>>,
}

impl Tracker {
    fn statuses(&self) -> Vec<(String, RunStatus)> {
        self.statuses.lock().unwrap().clone()
    }

    fn steps(&self) -> Vec<(String, StepStatus)> {
        self.steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunTracker for Tracker {
    async fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        _last_error: &str,
    ) -> Result<(), TrackerError> {
        assert_eq!(run_id, "run-1");
        self.statuses
            .lock()
            .unwrap()
            .push((run_id.to_string(), status));
        Ok(())
    }

    async fn append_run_log(
        &self,
        _run_id: &str,
        step: &str,
        status: StepStatus,
        _message: &str,
    ) -> Result<(), TrackerError> {
        self.steps.lock().unwrap().push((step.to_string(), status));
        Ok(())
    }
}

#[async_trait]
impl ResourceCloser for Tracker {
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Serves one profile whose provider is not supported.
struct ForeignProfile;

#[async_trait]
impl ModelProfileReader for ForeignProfile {
    async fn get_profile(&self, _model_profile_id: &str) -> Result<ModelProfile, ProfileError> {
        Ok(ModelProfile {
            provider: "runway".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            model_id: "gen-2".to_string(),
            timeout_ms: 1_000,
            max_retries: 0,
            safety_preset: "kids_strict".to_string(),
        })
    }
}

fn nim_profiles(server: &MockServer) -> Arc<dyn ModelProfileReader> {
    let base_url = server.uri();
    Arc::new(StaticModelProfileReader::from_lookup(move |key| match key {
        "NIM_BASE_URL" => Some(base_url.clone()),
        "NIM_TIMEOUT_MS" => Some("2000".to_string()),
        _ => None,
    }))
}

async fn mock_nim(server: &MockServer, status: u16, duration_ms: i64) {
    Mock::given(method("POST"))
        .and(path("/v1/generate/video"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "asset_id": "gen-asset-1",
            "source_url": "https://cdn.example.com/gen-asset-1.mp4",
            "duration_ms": duration_ms
        })))
        .mount(server)
        .await;
}

/// Both chains on one bus, sharing `tracker`.
async fn full_pipeline(
    profiles: Arc<dyn ModelProfileReader>,
    tracker: Arc<Tracker>,
) -> Harness {
    let harness = Harness::new();
    let bus = harness.dyn_bus();

    harness
        .mount(Arc::new(GenOrchestratorProcessor::new(
            bus.clone(),
            Harness::guard(),
            tracker.clone(),
        )))
        .await;
    harness
        .mount(Arc::new(GenNimProcessor::new(
            bus.clone(),
            Harness::guard(),
            profiles,
            Arc::new(DefaultProviderFactory),
            tracker.clone(),
        )))
        .await;
    harness
        .mount(Arc::new(GenQcProcessor::new(
            bus.clone(),
            Harness::guard(),
            tracker,
        )))
        .await;

    harness
        .mount(Arc::new(IngestProcessor::new(bus.clone(), Harness::guard())))
        .await;
    harness
        .mount(Arc::new(TranscodeProcessor::new(bus.clone(), Harness::guard())))
        .await;
    harness
        .mount(Arc::new(PolicyProcessor::new(bus.clone(), Harness::guard())))
        .await;
    harness
        .mount(Arc::new(PublishProcessor::new(
            bus,
            Harness::guard(),
            Arc::new(NoopCatalogProjector),
        )))
        .await;
    harness
}

#[tokio::test]
async fn test_requested_run_is_published_as_episode() {
    let server = MockServer::start().await;
    mock_nim(&server, 200, 90_000).await;
    let tracker = Arc::new(Tracker::default());
    let harness = full_pipeline(nim_profiles(&server), tracker.clone()).await;

    let steps = harness.sink(topics::VIDEO_RUN_STEP_COMPLETED).await;
    let ready = harness.sink(topics::VIDEO_ASSET_READY).await;
    let uploaded = harness.sink(topics::MEDIA_UPLOADED).await;
    let published = harness.sink(topics::EPISODE_PUBLISHED).await;
    let failed = harness.sink(topics::VIDEO_RUN_FAILED).await;

    harness
        .publish("run-evt-1", topics::VIDEO_RUN_REQUESTED, RUN_REQUESTED)
        .await
        .unwrap();

    let ready = ready.decoded::<VideoAssetReadyV1>();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].asset_id, "gen-asset-1");
    assert_eq!(ready[0].uploader_id, "admin-1");
    assert_eq!(ready[0].age_band, "6-11");

    let uploaded = uploaded.decoded::<MediaUploadedV1>();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].trace_id, "run-1");
    assert_eq!(uploaded[0].uploader_id, "admin-1");

    assert_eq!(published.decoded::<EpisodePublishedV1>().len(), 1);
    assert_eq!(failed.len(), 0);

    let mut step_names: Vec<String> = steps
        .decoded::<VideoRunStepCompletedV1>()
        .into_iter()
        .map(|s| s.step)
        .collect();
    step_names.sort();
    assert_eq!(step_names, vec!["nim", "orchestrator", "qc"]);

    let statuses: Vec<RunStatus> = tracker.statuses().into_iter().map(|(_, s)| s).collect();
    assert_eq!(statuses, vec![RunStatus::Running, RunStatus::PublishQueued]);
    assert!(tracker
        .steps()
        .iter()
        .all(|(_, status)| *status == StepStatus::Completed));
}

#[tokio::test]
async fn test_redelivered_request_generates_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/generate/video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "source_url": "https://cdn.example.com/gen.mp4",
            "duration_ms": 60_000
        })))
        .expect(1)
        .mount(&server)
        .await;
    let harness = full_pipeline(nim_profiles(&server), Arc::new(Tracker::default())).await;
    let published = harness.sink(topics::EPISODE_PUBLISHED).await;

    for _ in 0..2 {
        harness
            .publish("run-evt-1", topics::VIDEO_RUN_REQUESTED, RUN_REQUESTED)
            .await
            .unwrap();
    }

    assert_eq!(published.len(), 1);
}

#[tokio::test]
async fn test_provider_failure_fails_the_run() {
    let server = MockServer::start().await;
    mock_nim(&server, 500, 90_000).await;
    let tracker = Arc::new(Tracker::default());
    let harness = full_pipeline(nim_profiles(&server), tracker.clone()).await;

    let ready = harness.sink(topics::VIDEO_ASSET_READY).await;
    let failed = harness.sink(topics::VIDEO_RUN_FAILED).await;

    harness
        .publish("run-evt-1", topics::VIDEO_RUN_REQUESTED, RUN_REQUESTED)
        .await
        .expect("business failures are acknowledged");

    assert_eq!(ready.len(), 0);
    let failed = failed.decoded::<VideoRunFailedV1>();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].step, gen_nim::STEP);
    assert_eq!(failed[0].error_code, gen_nim::PROVIDER_ERROR);
    assert_eq!(failed[0].error_message, "nim server error status: 500");
    assert!(tracker
        .statuses()
        .contains(&("run-1".to_string(), RunStatus::Failed)));
    assert!(tracker
        .steps()
        .contains(&("nim".to_string(), StepStatus::Failed)));
}

#[tokio::test]
async fn test_unsupported_provider_fails_the_run() {
    let harness = full_pipeline(Arc::new(ForeignProfile), Arc::new(Tracker::default())).await;
    let failed = harness.sink(topics::VIDEO_RUN_FAILED).await;

    harness
        .publish("run-evt-1", topics::VIDEO_RUN_REQUESTED, RUN_REQUESTED)
        .await
        .unwrap();

    let failed = failed.decoded::<VideoRunFailedV1>();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_code, gen_nim::PROVIDER_ERROR);
    assert_eq!(failed[0].error_message, "unsupported provider: runway");
}

#[tokio::test]
async fn test_short_generation_is_rejected_by_qc() {
    let server = MockServer::start().await;
    mock_nim(&server, 200, 29_999).await;
    let harness = full_pipeline(nim_profiles(&server), Arc::new(Tracker::default())).await;

    let uploaded = harness.sink(topics::MEDIA_UPLOADED).await;
    let failed = harness.sink(topics::VIDEO_RUN_FAILED).await;

    harness
        .publish("run-evt-1", topics::VIDEO_RUN_REQUESTED, RUN_REQUESTED)
        .await
        .unwrap();

    assert_eq!(uploaded.len(), 0);
    let failed = failed.decoded::<VideoRunFailedV1>();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].step, gen_qc::STEP);
    assert_eq!(failed[0].error_code, gen_qc::QC_FAILED);
    assert_eq!(failed[0].error_message, "duration_ms outside qc bounds");
}

#[tokio::test]
async fn test_qc_duration_bounds_are_inclusive() {
    let harness = Harness::new();
    harness
        .mount(Arc::new(GenQcProcessor::new(
            harness.dyn_bus(),
            Harness::guard(),
            Arc::new(Tracker::default()),
        )))
        .await;
    let uploaded = harness.sink(topics::MEDIA_UPLOADED).await;
    let failed = harness.sink(topics::VIDEO_RUN_FAILED).await;

    let cases = [
        (29_999, false),
        (30_000, true),
        (1_800_000, true),
        (1_800_001, false),
    ];
    for (i, (duration_ms, _)) in cases.iter().enumerate() {
        let asset = VideoAssetReadyV1 {
            run_id: "run-1".to_string(),
            asset_id: format!("gen-{i}"),
            source_url: format!("https://cdn.example.com/gen-{i}.mp4"),
            duration_ms: *duration_ms,
            content_suitability: "kids".to_string(),
            age_band: "6-11".to_string(),
            uploader_id: String::new(),
            ready_at: "2026-01-01T00:00:00Z".to_string(),
        };
        harness
            .publish(
                &format!("ready-{i}"),
                topics::VIDEO_ASSET_READY,
                &serde_json::to_vec(&asset).unwrap(),
            )
            .await
            .unwrap();
    }

    let passed: Vec<String> = uploaded
        .decoded::<MediaUploadedV1>()
        .into_iter()
        .map(|u| u.asset_id)
        .collect();
    assert_eq!(passed, vec!["gen-1", "gen-2"]);
    assert!(uploaded
        .decoded::<MediaUploadedV1>()
        .iter()
        .all(|u| u.uploader_id == "admin-studio"));
    assert_eq!(failed.len(), 2);
    assert_eq!(
        cases.iter().filter(|(_, passes)| *passes).count(),
        passed.len()
    );
}

#[tokio::test]
async fn test_qc_rejects_relative_source_url() {
    let harness = Harness::new();
    harness
        .mount(Arc::new(GenQcProcessor::new(
            harness.dyn_bus(),
            Harness::guard(),
            Arc::new(Tracker::default()),
        )))
        .await;
    let failed = harness.sink(topics::VIDEO_RUN_FAILED).await;

    let asset = json!({
        "run_id": "run-1",
        "asset_id": "gen-1",
        "source_url": "/local/gen-1.mp4",
        "duration_ms": 60_000,
        "content_suitability": "kids",
        "age_band": "6-11",
        "ready_at": "2026-01-01T00:00:00Z"
    });
    harness
        .publish(
            "ready-1",
            topics::VIDEO_ASSET_READY,
            &serde_json::to_vec(&asset).unwrap(),
        )
        .await
        .unwrap();

    let failed = failed.decoded::<VideoRunFailedV1>();
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].error_message,
        "source_url must be absolute http(s) url"
    );
}
