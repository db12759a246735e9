use serde::{Deserialize, Serialize};

use crate::{require, topics, ContractError, EventContract};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaUploadedV1 {
    pub asset_id: String,
    pub source_url: String,
    pub uploader_id: String,
    pub trace_id: String,
}

impl EventContract for MediaUploadedV1 {
    const TOPIC: &'static str = topics::MEDIA_UPLOADED;

    fn validate(&self) -> Result<(), ContractError> {
        require(
            Self::TOPIC,
            &[&self.asset_id, &self.source_url, &self.uploader_id, &self.trace_id],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaTranscodeRequestedV1 {
    pub asset_id: String,
    pub source_url: String,
    pub trace_id: String,
}

impl EventContract for MediaTranscodeRequestedV1 {
    const TOPIC: &'static str = topics::MEDIA_TRANSCODE_REQUESTED;

    fn validate(&self) -> Result<(), ContractError> {
        require(Self::TOPIC, &[&self.asset_id, &self.source_url, &self.trace_id])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaRendition {
    pub profile: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaTranscodedV1 {
    pub asset_id: String,
    pub renditions: Vec<MediaRendition>,
    pub duration_ms: i64,
}

impl EventContract for MediaTranscodedV1 {
    const TOPIC: &'static str = topics::MEDIA_TRANSCODED;

    fn validate(&self) -> Result<(), ContractError> {
        if self.asset_id.is_empty() || self.renditions.is_empty() || self.duration_ms <= 0 {
            return Err(ContractError::Invalid {
                topic: Self::TOPIC,
                detail: "has invalid payload",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaReviewedV1 {
    pub asset_id: String,
    pub policy_result: String,
    pub age_band: String,
}

impl EventContract for MediaReviewedV1 {
    const TOPIC: &'static str = topics::MEDIA_REVIEWED;

    fn validate(&self) -> Result<(), ContractError> {
        require(
            Self::TOPIC,
            &[&self.asset_id, &self.policy_result, &self.age_band],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaApprovedV1 {
    pub asset_id: String,
    pub age_band: String,
    pub learning_tags: Vec<String>,
}

impl EventContract for MediaApprovedV1 {
    const TOPIC: &'static str = topics::MEDIA_APPROVED;

    fn validate(&self) -> Result<(), ContractError> {
        require(Self::TOPIC, &[&self.asset_id, &self.age_band])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodePublishedV1 {
    pub episode_id: String,
    pub age_band: String,
    pub learning_tags: Vec<String>,
}

impl EventContract for EpisodePublishedV1 {
    const TOPIC: &'static str = topics::EPISODE_PUBLISHED;

    fn validate(&self) -> Result<(), ContractError> {
        require(Self::TOPIC, &[&self.episode_id, &self.age_band])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_uploaded_contract() {
        let raw = r#"{"asset_id":"a1","source_url":"https://cdn/x.mp4","uploader_id":"u1","trace_id":"tr1"}"#;
        let event: MediaUploadedV1 = serde_json::from_str(raw).unwrap();
        assert!(event.validate().is_ok());
        assert_eq!(event.uploader_id, "u1");
    }

    #[test]
    fn test_media_uploaded_rejects_missing_uploader() {
        let raw = r#"{"asset_id":"a1","source_url":"https://cdn/x.mp4","trace_id":"tr1"}"#;
        let event: MediaUploadedV1 = serde_json::from_str(raw).unwrap();
        let err = event.validate().unwrap_err();
        assert_eq!(err.to_string(), "media.uploaded.v1 has missing required fields");
    }

    #[test]
    fn test_media_transcoded_contract() {
        let raw = r#"{"asset_id":"a1","renditions":[{"profile":"720p","url":"https://cdn/720.m3u8"}],"duration_ms":120000}"#;
        let event: MediaTranscodedV1 = serde_json::from_str(raw).unwrap();
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_media_transcoded_requires_renditions_and_duration() {
        let no_renditions = MediaTranscodedV1 {
            asset_id: "a1".to_string(),
            renditions: Vec::new(),
            duration_ms: 1000,
        };
        assert!(no_renditions.validate().is_err());

        let zero_duration = MediaTranscodedV1 {
            asset_id: "a1".to_string(),
            renditions: vec![MediaRendition {
                profile: "720p".to_string(),
                url: "https://cdn/720.m3u8".to_string(),
            }],
            duration_ms: 0,
        };
        assert_eq!(
            zero_duration.validate().unwrap_err().to_string(),
            "media.transcoded.v1 has invalid payload"
        );
    }

    #[test]
    fn test_media_approved_allows_empty_tags() {
        let event = MediaApprovedV1 {
            asset_id: "a1".to_string(),
            age_band: "6-11".to_string(),
            learning_tags: Vec::new(),
        };
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = r#"{"episode_id":"ep1","age_band":"3-5","learning_tags":["colors"],"season":2}"#;
        let event: EpisodePublishedV1 = serde_json::from_str(raw).unwrap();
        assert!(event.validate().is_ok());
    }
}
