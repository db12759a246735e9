//! Configuration shared by every worker binary.
//!
//! Everything is read from the environment once at startup. The `*_lookup`
//! variants take a `getenv`-style closure so tests never touch process state.

use db_pool::{DbConfig, DbPoolError};
use idempotent_consumer::PersistenceMode;
use sqlx::PgPool;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub persistence: PersistenceMode,
    /// `None` when `DATABASE_URL` is unset or blank
    pub database: Option<DbConfig>,
    /// `None` when `CATALOG_URL` is unset or not a valid URL
    pub catalog_url: Option<Url>,
}

impl WorkerConfig {
    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match DbConfig::from_lookup(service_name, &lookup) {
            Ok(config) => Some(config),
            Err(DbPoolError::MissingDatabaseUrl) => None,
            Err(e) => {
                warn!(service = %service_name, error = %e, "Ignoring database configuration");
                None
            }
        };

        let catalog_url = lookup("CATALOG_URL")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| match Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(catalog_url = %raw, error = %e, "Invalid CATALOG_URL, projection disabled");
                    None
                }
            });

        Self {
            persistence: PersistenceMode::from_lookup(&lookup),
            database,
            catalog_url,
        }
    }
}

/// Open the optional shared pool for run tracking and model profiles.
///
/// Strict mode turns a missing or unreachable database into an error.
/// Lenient mode returns `None` and the caller falls back to its no-database variant.
pub async fn connect_optional(
    service_name: &str,
    mode: PersistenceMode,
    database: Option<DbConfig>,
) -> anyhow::Result<Option<PgPool>> {
    let Some(config) = database else {
        if mode.is_strict() {
            anyhow::bail!("DATABASE_URL is required for {service_name} in strict persistence mode");
        }
        return Ok(None);
    };

    config.log_config();
    match db_pool::create_pool(config).await {
        Ok(pool) => {
            info!(service = %service_name, "Database pool ready");
            Ok(Some(pool))
        }
        Err(e) if mode.is_strict() => Err(e.into()),
        Err(e) => {
            warn!(
                service = %service_name,
                error = %e,
                "Database unreachable, continuing without persistence"
            );
            Ok(None)
        }
    }
}
