//! Database connection pool management
//!
//! Pool construction, connectivity verification and the embedded schema for
//! every pipeline table (`events.*`, `creator.*`).

mod metrics;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

pub use metrics::update_pool_metrics;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database verification timed out after {0}s")]
    VerificationTimeout(u64),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Database connection pool configuration
#[derive(Clone)]
pub struct DbConfig {
    /// Label used in logs and pool metrics
    pub service_name: String,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Upper bound for the post-connect `SELECT 1` verification
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (get connection from pool)
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl DbConfig {
    /// Create a new DbConfig from environment variables
    pub fn from_env(service_name: &str) -> Result<Self, DbPoolError> {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Result<Self, DbPoolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(DbPoolError::MissingDatabaseUrl)?;

        Ok(Self::for_url(service_name, database_url).with_overrides(lookup))
    }

    /// Defaults for an explicit URL, e.g. one passed on the command line.
    pub fn for_url(service_name: &str, database_url: impl Into<String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Apply `DB_*` pool tuning variables on top of the current values.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.max_connections = parse_or(lookup("DB_MAX_CONNECTIONS"), self.max_connections);
        self.min_connections = parse_or(lookup("DB_MIN_CONNECTIONS"), self.min_connections);
        self.connect_timeout_secs =
            parse_or(lookup("DB_CONNECT_TIMEOUT_SECS"), self.connect_timeout_secs);
        self.acquire_timeout_secs =
            parse_or(lookup("DB_ACQUIRE_TIMEOUT_SECS"), self.acquire_timeout_secs);
        self.idle_timeout_secs = parse_or(lookup("DB_IDLE_TIMEOUT_SECS"), self.idle_timeout_secs);
        self.max_lifetime_secs = parse_or(lookup("DB_MAX_LIFETIME_SECS"), self.max_lifetime_secs);
        self
    }

    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            "Database pool configuration"
        );
    }
}

/// Create a PostgreSQL pool and verify it answers `SELECT 1`.
pub async fn create_pool(config: DbConfig) -> Result<PgPool, DbPoolError> {
    debug!(
        service = %config.service_name,
        max = config.max_connections,
        min = config.min_connections,
        "Creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(&config.database_url)
        .await?;

    match tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        sqlx::query("SELECT 1").execute(&pool),
    )
    .await
    {
        Ok(Ok(_)) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );
            update_pool_metrics(&pool, &config.service_name);
            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            pool.close().await;
            Err(e.into())
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            pool.close().await;
            Err(DbPoolError::VerificationTimeout(config.connect_timeout_secs))
        }
    }
}

/// Apply the embedded `events` and `creator` schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), DbPoolError> {
    debug!("Running embedded database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed successfully");
    Ok(())
}
