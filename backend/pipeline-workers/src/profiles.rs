//! Model profiles resolve a run's `model_profile_id` to provider settings.

use async_trait::async_trait;
use idempotent_consumer::PersistenceMode;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ProfileError;

pub const DEFAULT_PROFILE_ID: &str = "nim-default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    pub provider: String,
    pub base_url: String,
    pub model_id: String,
    pub timeout_ms: i64,
    pub max_retries: i32,
    pub safety_preset: String,
}

#[async_trait]
pub trait ModelProfileReader: Send + Sync {
    async fn get_profile(&self, model_profile_id: &str) -> Result<ModelProfile, ProfileError>;
}

/// One profile for every ID, from `NIM_*` variables.
#[derive(Debug, Clone)]
pub struct StaticModelProfileReader {
    profile: ModelProfile,
}

impl StaticModelProfileReader {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, fallback: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        let number = |key: &str, fallback: i64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(fallback)
        };

        Self {
            profile: ModelProfile {
                provider: "nvidia_nim".to_string(),
                base_url: text("NIM_BASE_URL", "http://127.0.0.1:9000"),
                model_id: text("NIM_MODEL_ID", "nim-video-v1"),
                timeout_ms: number("NIM_TIMEOUT_MS", 15_000),
                max_retries: number("NIM_MAX_RETRIES", 2) as i32,
                safety_preset: text("NIM_SAFETY_PRESET", "kids_strict"),
            },
        }
    }
}

#[async_trait]
impl ModelProfileReader for StaticModelProfileReader {
    async fn get_profile(&self, _model_profile_id: &str) -> Result<ModelProfile, ProfileError> {
        Ok(self.profile.clone())
    }
}

/// Reads `creator.model_profiles`. An empty ID selects [`DEFAULT_PROFILE_ID`].
pub struct PgModelProfileReader {
    pool: PgPool,
}

impl PgModelProfileReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelProfileReader for PgModelProfileReader {
    async fn get_profile(&self, model_profile_id: &str) -> Result<ModelProfile, ProfileError> {
        let id = if model_profile_id.is_empty() {
            DEFAULT_PROFILE_ID
        } else {
            model_profile_id
        };

        let row = sqlx::query(
            r#"
            SELECT provider, base_url, model_id, timeout_ms, max_retries, safety_preset
            FROM creator.model_profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ProfileError::NotFound(id.to_string()))?;

        Ok(ModelProfile {
            provider: row.try_get("provider")?,
            base_url: row.try_get("base_url")?,
            model_id: row.try_get("model_id")?,
            timeout_ms: i64::from(row.try_get::<i32, _>("timeout_ms")?),
            max_retries: row.try_get("max_retries")?,
            safety_preset: row.try_get("safety_preset")?,
        })
    }
}

/// Database-backed reader when a pool is available, env defaults otherwise.
/// Strict mode refuses to run without the database.
pub fn model_profile_reader_for(
    pool: Option<PgPool>,
    mode: PersistenceMode,
) -> Result<Arc<dyn ModelProfileReader>, ProfileError> {
    match pool {
        Some(pool) => {
            info!("Model profiles read from creator.model_profiles");
            Ok(Arc::new(PgModelProfileReader::new(pool)))
        }
        None if mode.is_strict() => Err(ProfileError::StrictPersistence(
            "DATABASE_URL is required for worker-gen-nim in strict persistence mode".to_string(),
        )),
        None => {
            warn!("No database configured, using static NIM model profile");
            Ok(Arc::new(StaticModelProfileReader::from_env()))
        }
    }
}
