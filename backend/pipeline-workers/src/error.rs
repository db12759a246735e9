//! Error types for pipeline stages and their collaborators.

use event_bus::BusError;
use event_schema::ContractError;
use thiserror::Error;

/// Failures that make a stage reject a delivery.
///
/// Every variant propagates out of `handle`, so the broker redelivers.
/// Business failures never show up here; they become `*.failed.v1` events.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("decode {topic} payload: {source}")]
    Decode {
        topic: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ContractError),

    #[error("publish {topic}: {source}")]
    Publish {
        topic: &'static str,
        #[source]
        source: BusError,
    },
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unsupported provider: {0}")]
    Unsupported(String),

    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("nim request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("nim server error status: {0}")]
    ServerError(u16),

    #[error("nim request rejected status: {0}")]
    Rejected(u16),

    #[error("decode nim response: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("query model profile: {0}")]
    Database(#[from] sqlx::Error),

    #[error("model profile {0} not found")]
    NotFound(String),

    #[error("{0}")]
    StrictPersistence(String),
}

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("project episode request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("project episode status code: {0}")]
    Status(u16),
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("update workflow run status: {0}")]
    Status(#[source] sqlx::Error),

    #[error("insert run log: {0}")]
    Log(#[source] sqlx::Error),
}
