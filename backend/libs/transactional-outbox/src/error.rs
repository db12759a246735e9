//! Error types for the transactional outbox library.

use event_bus::BusError;
use thiserror::Error;

/// Result type alias for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] db_pool::DbPoolError),

    /// Every outbox row is keyed by its event ID
    #[error("event id is required for persistent outbox")]
    MissingEventId,

    /// The dead-letter event for an exhausted row could not be published
    #[error("publish outbox dlq event: {0}")]
    DeadLetter(#[source] BusError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidArgument(String),
}
