/// Wire contracts for every pipeline topic.
///
/// Payloads are versioned by topic suffix (`.v1`). Adding an optional field
/// is compatible in both directions: unknown fields are ignored on decode and
/// absent fields fall back to their default, which `validate()` then rejects
/// when the field is required.
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

mod dead_letter;
mod generation;
mod media;

pub use dead_letter::{dead_letter_topic, DeadLetterV1, DLQ_SUFFIX};
pub use generation::{
    VideoAssetReadyV1, VideoRunFailedV1, VideoRunRequestedV1, VideoRunStepCompletedV1,
};
pub use media::{
    EpisodePublishedV1, MediaApprovedV1, MediaRendition, MediaReviewedV1,
    MediaTranscodeRequestedV1, MediaTranscodedV1, MediaUploadedV1,
};

pub mod topics {
    pub const MEDIA_UPLOADED: &str = "media.uploaded.v1";
    pub const MEDIA_TRANSCODE_REQUESTED: &str = "media.transcode.requested.v1";
    pub const MEDIA_TRANSCODED: &str = "media.transcoded.v1";
    pub const MEDIA_REVIEWED: &str = "media.reviewed.v1";
    pub const MEDIA_APPROVED: &str = "media.approved.v1";
    pub const EPISODE_PUBLISHED: &str = "episode.published.v1";

    pub const VIDEO_RUN_REQUESTED: &str = "video.run.requested.v1";
    pub const VIDEO_ASSET_READY: &str = "video.asset.ready.v1";
    pub const VIDEO_RUN_FAILED: &str = "video.run.failed.v1";
    pub const VIDEO_RUN_STEP_COMPLETED: &str = "video.run.step.completed.v1";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("{0} has missing required fields")]
    MissingFields(&'static str),

    #[error("{topic} {detail}")]
    Invalid {
        topic: &'static str,
        detail: &'static str,
    },
}

/// A typed payload bound to exactly one topic.
pub trait EventContract: Serialize + DeserializeOwned {
    const TOPIC: &'static str;

    /// Semantic checks beyond JSON shape.
    fn validate(&self) -> Result<(), ContractError>;
}

pub(crate) fn require(topic: &'static str, fields: &[&str]) -> Result<(), ContractError> {
    if fields.iter().any(|field| field.is_empty()) {
        return Err(ContractError::MissingFields(topic));
    }
    Ok(())
}
