//! Video generation providers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::profiles::ModelProfile;

pub const NVIDIA_NIM: &str = "nvidia_nim";

const DEFAULT_TIMEOUT_MS: i64 = 15_000;
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9000";
const DEFAULT_DURATION_MS: i64 = 120_000;
const GENERATE_PATH: &str = "/v1/generate/video";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub run_id: String,
    pub input_payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateResult {
    pub asset_id: String,
    pub source_url: String,
    pub duration_ms: i64,
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn generate_video(&self, request: &GenerateRequest) -> Result<GenerateResult, ProviderError>;
}

/// Resolves a model profile to the provider that serves it.
pub trait ProviderFactory: Send + Sync {
    fn provider_for(&self, profile: &ModelProfile) -> Result<Arc<dyn VideoProvider>, ProviderError>;
}

/// Supports `nvidia_nim` only.
#[derive(Debug, Default)]
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn provider_for(&self, profile: &ModelProfile) -> Result<Arc<dyn VideoProvider>, ProviderError> {
        match profile.provider.as_str() {
            NVIDIA_NIM => Ok(Arc::new(NimProvider::new(profile)?)),
            other => Err(ProviderError::Unsupported(other.to_string())),
        }
    }
}

#[derive(Serialize)]
struct NimRequest<'a> {
    model_id: &'a str,
    input_payload: &'a Value,
    run_id: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct NimResponse {
    asset_id: String,
    source_url: String,
    duration_ms: i64,
}

pub struct NimProvider {
    client: Client,
    endpoint: Url,
    model_id: String,
}

impl NimProvider {
    /// A non-positive timeout falls back to 15s, an unparsable base URL to
    /// the local default.
    pub fn new(profile: &ModelProfile) -> Result<Self, ProviderError> {
        let timeout_ms = if profile.timeout_ms > 0 {
            profile.timeout_ms
        } else {
            DEFAULT_TIMEOUT_MS
        };
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms as u64))
            .build()
            .map_err(ProviderError::Client)?;

        let mut endpoint = Url::parse(&profile.base_url)
            .or_else(|_| Url::parse(DEFAULT_BASE_URL))
            .map_err(|_| ProviderError::Unsupported(profile.base_url.clone()))?;
        endpoint.set_path(GENERATE_PATH);

        Ok(Self {
            client,
            endpoint,
            model_id: profile.model_id.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl VideoProvider for NimProvider {
    async fn generate_video(&self, request: &GenerateRequest) -> Result<GenerateResult, ProviderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&NimRequest {
                model_id: &self.model_id,
                input_payload: &request.input_payload,
                run_id: &request.run_id,
            })
            .send()
            .await
            .map_err(ProviderError::Request)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::ServerError(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(ProviderError::Rejected(status.as_u16()));
        }

        let decoded: NimResponse = response.json().await.map_err(ProviderError::Decode)?;
        let asset_id = if decoded.asset_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            decoded.asset_id
        };
        let duration_ms = if decoded.duration_ms > 0 {
            decoded.duration_ms
        } else {
            DEFAULT_DURATION_MS
        };
        let source_url = if decoded.source_url.is_empty() {
            format!("https://cdn.generated.local/{asset_id}.mp4")
        } else {
            decoded.source_url
        };

        debug!(run_id = %request.run_id, asset_id = %asset_id, "NIM generation returned");
        Ok(GenerateResult {
            asset_id,
            source_url,
            duration_ms,
        })
    }
}
