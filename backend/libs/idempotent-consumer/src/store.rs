use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{IdempotencyError, IdempotencyResult};

/// Default retention for durable keys
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// First-seen check. Records `event_id` and returns `false` the first time,
/// `true` afterwards.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn seen(&self, event_id: &str) -> bool;
}

/// Process-lifetime set of seen IDs. Never expires.
#[derive(Debug, Default)]
pub struct MemoryIdempotencyStore {
    seen: Mutex<HashSet<String>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn seen(&self, event_id: &str) -> bool {
        if event_id.is_empty() {
            return false;
        }
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        !seen.insert(event_id.to_string())
    }
}

/// Durable keys in `events.idempotency_keys`, one row per (scope, event).
#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
    consumer_scope: String,
    ttl: Duration,
}

impl PgIdempotencyStore {
    pub fn new(pool: PgPool, consumer_scope: impl Into<String>, ttl: Duration) -> Self {
        Self {
            pool,
            consumer_scope: consumer_scope.into(),
            ttl,
        }
    }

    pub fn consumer_scope(&self) -> &str {
        &self.consumer_scope
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert-if-absent. A key whose TTL has lapsed is renewed and counts as fresh.
    pub async fn try_seen(&self, event_id: &str) -> IdempotencyResult<bool> {
        if event_id.is_empty() {
            return Err(IdempotencyError::InvalidEventId(
                "event_id cannot be empty".to_string(),
            ));
        }

        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(7));
        let expires_at = Utc::now() + ttl;

        let result = sqlx::query(
            r#"
            INSERT INTO events.idempotency_keys (consumer_scope, event_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (consumer_scope, event_id) DO UPDATE
                SET expires_at = EXCLUDED.expires_at
                WHERE events.idempotency_keys.expires_at < now()
            "#,
        )
        .bind(&self.consumer_scope)
        .bind(event_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let seen = result.rows_affected() == 0;
        if seen {
            debug!(
                consumer_scope = %self.consumer_scope,
                event_id = %event_id,
                "Idempotency key already present"
            );
        }
        Ok(seen)
    }

    /// Delete keys past their TTL. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> IdempotencyResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM events.idempotency_keys
            WHERE consumer_scope = $1 AND expires_at < now()
            "#,
        )
        .bind(&self.consumer_scope)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        info!(
            consumer_scope = %self.consumer_scope,
            deleted_count = deleted,
            "Purged expired idempotency keys"
        );
        Ok(deleted)
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    /// Store errors count as unseen.
    async fn seen(&self, event_id: &str) -> bool {
        if event_id.is_empty() {
            return false;
        }
        match self.try_seen(event_id).await {
            Ok(seen) => seen,
            Err(e) => {
                warn!(
                    consumer_scope = %self.consumer_scope,
                    event_id = %event_id,
                    error = %e,
                    "Idempotency check failed, treating event as new"
                );
                false
            }
        }
    }
}
