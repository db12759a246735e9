//! Stage processors for the content publishing and generative-video chains.

use chrono::{SecondsFormat, Utc};
use event_schema::{VideoRunFailedV1, VideoRunStepCompletedV1};

pub mod gen_nim;
pub mod gen_orchestrator;
pub mod gen_qc;
pub mod ingest;
pub mod policy;
pub mod publish;
pub mod transcode;

pub use gen_nim::GenNimProcessor;
pub use gen_orchestrator::GenOrchestratorProcessor;
pub use gen_qc::GenQcProcessor;
pub use ingest::IngestProcessor;
pub use policy::PolicyProcessor;
pub use publish::PublishProcessor;
pub use transcode::TranscodeProcessor;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn step_completed(run_id: &str, step: &str, details: &str) -> VideoRunStepCompletedV1 {
    VideoRunStepCompletedV1 {
        run_id: run_id.to_string(),
        step: step.to_string(),
        status: "completed".to_string(),
        details: details.to_string(),
        completed_at: timestamp(),
    }
}

fn run_failed(run_id: &str, step: &str, error_code: &str, message: &str) -> VideoRunFailedV1 {
    VideoRunFailedV1 {
        run_id: run_id.to_string(),
        step: step.to_string(),
        error_code: error_code.to_string(),
        error_message: message.to_string(),
        failed_at: timestamp(),
    }
}
