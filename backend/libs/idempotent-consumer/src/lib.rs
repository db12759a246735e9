//! # Idempotency Guard
//!
//! Converts at-least-once delivery into an effectively-once business effect.
//! Each stage processor asks [`IdempotencyGuard::seen`] before doing any work:
//! the first call for an event ID returns `false` and records it, every later
//! call returns `true`.
//!
//! ## Backends
//!
//! - **Durable**: one row per `(consumer_scope, event_id)` in
//!   `events.idempotency_keys` with a 7 day TTL. Survives restarts.
//! - **Ephemeral**: a mutex-guarded set that lives as long as the process.
//!
//! The backend is chosen once by [`IdempotencyGuard::scoped`] and never
//! re-evaluated. [`IdempotencyGuard::backend`] reports the outcome.
//!
//! | Scope | Database config | Connect | Mode | Result |
//! |-------|-----------------|---------|------|--------|
//! | empty | any | - | any | Ephemeral |
//! | set | none | - | Strict | `Err(StrictPersistence)` |
//! | set | none | - | Lenient | Ephemeral |
//! | set | some | fails | Strict | `Err` |
//! | set | some | fails | Lenient | Ephemeral (warn) |
//! | set | some | ok | any | Durable |
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use idempotent_consumer::{IdempotencyGuard, PersistenceMode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = db_pool::DbConfig::from_env("worker-ingest").ok();
//! let guard = IdempotencyGuard::scoped("worker-ingest", PersistenceMode::from_env(), config).await?;
//!
//! if guard.seen("evt-123").await {
//!     return Ok(());
//! }
//! // first delivery: do the work
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use db_pool::DbConfig;
use event_bus::ResourceCloser;
use tracing::{info, warn};

mod error;
mod mode;
mod store;

pub use error::{IdempotencyError, IdempotencyResult};
pub use mode::PersistenceMode;
pub use store::{IdempotencyStore, MemoryIdempotencyStore, PgIdempotencyStore, DEFAULT_KEY_TTL};

/// Which store a guard ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardBackend {
    Durable,
    Ephemeral,
}

enum Backend {
    Durable(PgIdempotencyStore),
    Ephemeral(MemoryIdempotencyStore),
}

pub struct IdempotencyGuard {
    scope: String,
    backend: Backend,
}

impl IdempotencyGuard {
    /// Process-local guard with no persistence.
    pub fn in_memory() -> Self {
        Self {
            scope: String::new(),
            backend: Backend::Ephemeral(MemoryIdempotencyStore::new()),
        }
    }

    pub fn durable(store: PgIdempotencyStore) -> Self {
        Self {
            scope: store.consumer_scope().to_string(),
            backend: Backend::Durable(store),
        }
    }

    /// Resolve the guard for `scope` according to `mode`.
    ///
    /// `database` is the pool configuration when a database is configured.
    pub async fn scoped(
        scope: &str,
        mode: PersistenceMode,
        database: Option<DbConfig>,
    ) -> IdempotencyResult<Self> {
        if scope.is_empty() {
            return Ok(Self::in_memory());
        }

        let Some(config) = database else {
            if mode.is_strict() {
                return Err(IdempotencyError::StrictPersistence(format!(
                    "DATABASE_URL is required for idempotency scope {scope}"
                )));
            }
            warn!(scope = %scope, "No database configured, idempotency keys kept in memory");
            return Ok(Self::ephemeral(scope));
        };

        match db_pool::create_pool(config).await {
            Ok(pool) => {
                info!(scope = %scope, "Durable idempotency guard ready");
                Ok(Self::durable(PgIdempotencyStore::new(pool, scope, DEFAULT_KEY_TTL)))
            }
            Err(e) if mode.is_strict() => Err(e.into()),
            Err(e) => {
                warn!(
                    scope = %scope,
                    error = %e,
                    "Idempotency store unreachable, falling back to memory"
                );
                Ok(Self::ephemeral(scope))
            }
        }
    }

    fn ephemeral(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            backend: Backend::Ephemeral(MemoryIdempotencyStore::new()),
        }
    }

    pub fn backend(&self) -> GuardBackend {
        match self.backend {
            Backend::Durable(_) => GuardBackend::Durable,
            Backend::Ephemeral(_) => GuardBackend::Ephemeral,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// `false` on first sighting of `event_id` (recorded), `true` afterwards.
    /// Empty IDs are never recorded and always report `false`.
    pub async fn seen(&self, event_id: &str) -> bool {
        match &self.backend {
            Backend::Durable(store) => store.seen(event_id).await,
            Backend::Ephemeral(store) => store.seen(event_id).await,
        }
    }
}

#[async_trait]
impl IdempotencyStore for IdempotencyGuard {
    async fn seen(&self, event_id: &str) -> bool {
        IdempotencyGuard::seen(self, event_id).await
    }
}

#[async_trait]
impl ResourceCloser for IdempotencyGuard {
    async fn close(&self) -> anyhow::Result<()> {
        if let Backend::Durable(store) = &self.backend {
            store.pool().close().await;
        }
        Ok(())
    }
}
