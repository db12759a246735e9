//! Catalog projection for published episodes.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::ProjectionError;

const PROJECTION_TIMEOUT: Duration = Duration::from_secs(2);
const EPISODES_PATH: &str = "/internal/catalog/episodes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeProjection {
    pub episode_id: String,
    pub age_band: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub learning_tags: Vec<String>,
    pub playback_ready: bool,
}

#[async_trait]
pub trait CatalogProjector: Send + Sync {
    async fn project_episode(&self, episode: &EpisodeProjection) -> Result<(), ProjectionError>;
}

/// POSTs to `<CATALOG_URL>/internal/catalog/episodes` and expects `202 Accepted`.
pub struct HttpCatalogProjector {
    client: Client,
    endpoint: Url,
}

impl HttpCatalogProjector {
    pub fn new(base_url: &Url) -> Result<Self, ProjectionError> {
        let client = Client::builder()
            .timeout(PROJECTION_TIMEOUT)
            .build()
            .map_err(ProjectionError::Client)?;

        let mut endpoint = base_url.clone();
        endpoint.set_path(EPISODES_PATH);
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CatalogProjector for HttpCatalogProjector {
    async fn project_episode(&self, episode: &EpisodeProjection) -> Result<(), ProjectionError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(episode)
            .send()
            .await
            .map_err(ProjectionError::Request)?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(ProjectionError::Status(response.status().as_u16()));
        }
        debug!(episode_id = %episode.episode_id, "Episode projected into catalog");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopCatalogProjector;

#[async_trait]
impl CatalogProjector for NoopCatalogProjector {
    async fn project_episode(&self, _episode: &EpisodeProjection) -> Result<(), ProjectionError> {
        Ok(())
    }
}

/// HTTP projector when a catalog URL is configured, no-op otherwise.
pub fn catalog_projector_for(catalog_url: Option<&Url>) -> Result<Arc<dyn CatalogProjector>, ProjectionError> {
    match catalog_url {
        Some(url) => {
            let projector = HttpCatalogProjector::new(url)?;
            info!(endpoint = %projector.endpoint(), "Catalog projection enabled");
            Ok(Arc::new(projector))
        }
        None => {
            info!("CATALOG_URL not set, catalog projection disabled");
            Ok(Arc::new(NoopCatalogProjector))
        }
    }
}
