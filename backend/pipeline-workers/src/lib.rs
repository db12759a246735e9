//! # Pipeline Workers
//!
//! Stage processors for the two event-driven workflow chains, plus the
//! collaborators they call out to and the runtime that hosts them.
//!
//! ```text
//! media.uploaded.v1 -> ingest -> media.transcode.requested.v1 -> transcode
//!   -> media.transcoded.v1 -> policy -> media.reviewed.v1 + media.approved.v1
//!   -> publish -> episode.published.v1
//!
//! video.run.requested.v1 -> gen-orchestrator -> video.run.step.completed.v1
//!                        -> gen-nim -> video.asset.ready.v1 -> gen-qc
//!                                   -> media.uploaded.v1 (content chain)
//! ```
//!
//! Every processor follows the same gate: dedup on the event ID, ignore
//! mis-routed topics, decode and validate. Only delivery-level failures are
//! returned to the bus; business failures become `video.run.failed.v1`.

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod processors;
pub mod profiles;
pub mod provider;
pub mod run_tracker;
pub mod runtime;
pub mod stage;
pub mod transforms;

#[cfg(test)]
mod test_support;

pub use config::WorkerConfig;
pub use error::{ProfileError, ProjectionError, ProviderError, StageError, TrackerError};
pub use runtime::{WorkerKind, WorkerRuntime};
pub use stage::{stage_handler, StageGate, StageProcessor};
