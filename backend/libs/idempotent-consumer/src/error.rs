//! Error types for the idempotency guard

use thiserror::Error;

/// Result type for idempotency operations
pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

#[derive(Error, Debug)]
pub enum IdempotencyError {
    /// Database operation failed (connection, query execution, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Pool construction or verification failed
    #[error("Database pool error: {0}")]
    Pool(#[from] db_pool::DbPoolError),

    #[error("Invalid event ID: {0}")]
    InvalidEventId(String),

    /// Strict persistence was requested but the durable store is unavailable
    #[error("Strict persistence violated: {0}")]
    StrictPersistence(String),
}

impl IdempotencyError {
    /// Check if error is transient (should retry)
    pub fn is_transient(&self) -> bool {
        match self {
            IdempotencyError::Database(sqlx_err) => {
                matches!(
                    sqlx_err,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            _ => false,
        }
    }
}
