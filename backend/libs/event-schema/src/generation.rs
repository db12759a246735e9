use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{require, topics, ContractError, EventContract};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoRunRequestedV1 {
    pub run_id: String,
    pub workflow_id: String,
    pub model_profile_id: String,
    /// Provider-specific generation input, forwarded untouched
    #[serde(skip_serializing_if = "Value::is_null")]
    pub input_payload: Value,
    pub auto_publish: bool,
    pub priority: String,
    pub content_suitability: String,
    pub age_band: String,
    pub requested_by: String,
    pub requested_at: String,
    pub trace_id: String,
}

impl EventContract for VideoRunRequestedV1 {
    const TOPIC: &'static str = topics::VIDEO_RUN_REQUESTED;

    fn validate(&self) -> Result<(), ContractError> {
        require(
            Self::TOPIC,
            &[
                &self.run_id,
                &self.workflow_id,
                &self.model_profile_id,
                &self.requested_by,
            ],
        )?;
        if [
            &self.requested_at,
            &self.trace_id,
            &self.content_suitability,
            &self.age_band,
        ]
        .iter()
        .any(|field| field.is_empty())
        {
            return Err(ContractError::Invalid {
                topic: Self::TOPIC,
                detail: "has missing metadata fields",
            });
        }
        if self.priority.is_empty() {
            return Err(ContractError::Invalid {
                topic: Self::TOPIC,
                detail: "requires priority",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoAssetReadyV1 {
    pub run_id: String,
    pub asset_id: String,
    pub source_url: String,
    pub duration_ms: i64,
    pub content_suitability: String,
    pub age_band: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uploader_id: String,
    pub ready_at: String,
}

impl EventContract for VideoAssetReadyV1 {
    const TOPIC: &'static str = topics::VIDEO_ASSET_READY;

    fn validate(&self) -> Result<(), ContractError> {
        require(
            Self::TOPIC,
            &[&self.run_id, &self.asset_id, &self.source_url, &self.ready_at],
        )?;
        if self.content_suitability.is_empty() || self.age_band.is_empty() {
            return Err(ContractError::Invalid {
                topic: Self::TOPIC,
                detail: "has missing content fields",
            });
        }
        if self.duration_ms <= 0 {
            return Err(ContractError::Invalid {
                topic: Self::TOPIC,
                detail: "requires positive duration_ms",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoRunFailedV1 {
    pub run_id: String,
    pub step: String,
    pub error_code: String,
    pub error_message: String,
    pub failed_at: String,
}

impl EventContract for VideoRunFailedV1 {
    const TOPIC: &'static str = topics::VIDEO_RUN_FAILED;

    fn validate(&self) -> Result<(), ContractError> {
        require(
            Self::TOPIC,
            &[
                &self.run_id,
                &self.step,
                &self.error_code,
                &self.error_message,
                &self.failed_at,
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoRunStepCompletedV1 {
    pub run_id: String,
    pub step: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub completed_at: String,
}

impl EventContract for VideoRunStepCompletedV1 {
    const TOPIC: &'static str = topics::VIDEO_RUN_STEP_COMPLETED;

    fn validate(&self) -> Result<(), ContractError> {
        require(
            Self::TOPIC,
            &[&self.run_id, &self.step, &self.status, &self.completed_at],
        )
    }
}
