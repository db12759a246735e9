//! Error types for the event bus.

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Result type alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur while publishing or subscribing.
#[derive(Error, Debug)]
pub enum BusError {
    /// Broker client or delivery failure
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// A subscribed handler rejected the event
    #[error("Handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    /// Payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Publish or subscribe after `close`
    #[error("Event bus is closed")]
    Closed,
}
