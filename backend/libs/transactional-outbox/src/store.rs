use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_bus::{Event, ResourceCloser};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use crate::error::{OutboxError, OutboxResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "published" => Ok(OutboxStatus::Published),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(OutboxError::InvalidArgument(format!(
                "unknown outbox status {other:?}"
            ))),
        }
    }
}

/// One row of `events.outbox`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRow {
    pub id: i64,
    pub event_id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub available_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRow {
    pub fn to_event(&self) -> Event {
        Event::new(self.event_id.clone(), self.topic.clone(), self.payload.clone())
    }
}

/// Row-level persistence used by the outbox.
///
/// Every `mark_*` transition only applies to a row that is still `pending`,
/// so concurrent flushes never move a row backwards.
#[async_trait]
pub trait OutboxStore: ResourceCloser {
    /// Insert a pending row. Returns `false` when the event ID already exists.
    async fn insert(&self, event: &Event) -> OutboxResult<bool>;

    /// Pending rows with `available_at <= now`, oldest first.
    async fn pending(&self, limit: i64, now: DateTime<Utc>) -> OutboxResult<Vec<OutboxRow>>;

    async fn mark_published(&self, id: i64) -> OutboxResult<()>;

    /// Keep the row pending and push `available_at` out.
    async fn mark_retry(
        &self,
        id: i64,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> OutboxResult<()>;

    async fn mark_failed(&self, id: i64, error: &str) -> OutboxResult<()>;

    /// (pending row count, age in seconds of the oldest pending row)
    async fn pending_stats(&self) -> OutboxResult<(i64, i64)>;
}

#[derive(Default)]
struct MemoryRows {
    rows: Vec<OutboxRow>,
    next_id: i64,
}

/// Volatile outbox table for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryOutboxStore {
    state: Mutex<MemoryRows>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row in insertion order.
    pub fn rows(&self) -> Vec<OutboxRow> {
        self.lock().rows.clone()
    }

    pub fn find(&self, event_id: &str) -> Option<OutboxRow> {
        self.lock()
            .rows
            .iter()
            .find(|row| row.event_id == event_id)
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRows> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_pending<F>(&self, id: i64, apply: F)
    where
        F: FnOnce(&mut OutboxRow),
    {
        let mut state = self.lock();
        if let Some(row) = state
            .rows
            .iter_mut()
            .find(|row| row.id == id && row.status == OutboxStatus::Pending)
        {
            apply(row);
        }
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(&self, event: &Event) -> OutboxResult<bool> {
        let mut state = self.lock();
        if state.rows.iter().any(|row| row.event_id == event.id) {
            return Ok(false);
        }

        state.next_id += 1;
        let now = Utc::now();
        let row = OutboxRow {
            id: state.next_id,
            event_id: event.id.clone(),
            topic: event.topic.clone(),
            payload: event.payload.clone(),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: now,
            published_at: None,
            created_at: now,
        };
        state.rows.push(row);
        Ok(true)
    }

    async fn pending(&self, limit: i64, now: DateTime<Utc>) -> OutboxResult<Vec<OutboxRow>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .lock()
            .rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending && row.available_at <= now)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: i64) -> OutboxResult<()> {
        self.update_pending(id, |row| {
            row.status = OutboxStatus::Published;
            row.attempts += 1;
            row.last_error = None;
            row.published_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: i64,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        self.update_pending(id, |row| {
            row.attempts += 1;
            row.last_error = Some(error.to_string());
            row.available_at = available_at;
        });
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> OutboxResult<()> {
        self.update_pending(id, |row| {
            row.status = OutboxStatus::Failed;
            row.attempts += 1;
            row.last_error = Some(error.to_string());
        });
        Ok(())
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let state = self.lock();
        let now = Utc::now();
        let pending: Vec<&OutboxRow> = state
            .rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending)
            .collect();
        let oldest = pending
            .iter()
            .map(|row| (now - row.created_at).num_seconds())
            .max()
            .unwrap_or(0);
        Ok((pending.len() as i64, oldest))
    }
}

#[async_trait]
impl ResourceCloser for InMemoryOutboxStore {
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
