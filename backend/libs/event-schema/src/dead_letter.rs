use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DLQ_SUFFIX: &str = ".dlq.v1";

/// Dead-letter topic for `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{}{}", topic, DLQ_SUFFIX)
}

/// Emitted once when an outbox row exhausts its publish attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterV1 {
    pub event_id: String,
    pub original_topic: String,
    pub error: String,
    pub attempts: i32,
    /// RFC 3339, UTC
    pub failed_at: String,
    /// Original payload. Embedded as JSON when it parses, as a string otherwise.
    pub payload: Value,
}

impl DeadLetterV1 {
    /// Embed `raw` so downstream consumers see the original document.
    pub fn payload_value(raw: &[u8]) -> Value {
        serde_json::from_slice(raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
    }
}
