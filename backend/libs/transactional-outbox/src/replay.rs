//! Operator tooling over failed outbox rows.

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, ValueEnum};
use db_pool::DbConfig;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;

use crate::error::{OutboxError, OutboxResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEvent {
    pub event_id: String,
    pub topic: String,
    pub attempts: i32,
    pub last_error: String,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub struct ReplayStore {
    pool: PgPool,
}

impl ReplayStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> OutboxResult<Self> {
        let pool = db_pool::create_pool(DbConfig::for_url("outbox-replay", database_url)).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Most recent failed rows first.
    pub async fn list_failed(&self, topic: Option<&str>, limit: i64) -> OutboxResult<Vec<FailedEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, topic, attempts, COALESCE(last_error, '') AS last_error,
                   available_at, created_at
            FROM events.outbox
            WHERE status = 'failed' AND ($1::TEXT IS NULL OR topic = $1)
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(topic)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FailedEvent {
                    event_id: row.try_get("event_id")?,
                    topic: row.try_get("topic")?,
                    attempts: row.try_get("attempts")?,
                    last_error: row.try_get("last_error")?,
                    available_at: row.try_get("available_at")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Move up to `limit` failed rows (oldest first) back to pending.
    /// With `dry_run` only the candidates are returned.
    pub async fn requeue_failed(
        &self,
        topic: Option<&str>,
        limit: i64,
        dry_run: bool,
        reset_attempts: bool,
    ) -> OutboxResult<Vec<String>> {
        let candidates: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT event_id
            FROM events.outbox
            WHERE status = 'failed' AND ($1::TEXT IS NULL OR topic = $1)
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(topic)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        if dry_run || candidates.is_empty() {
            return Ok(candidates);
        }
        self.requeue_event_ids(&candidates, reset_attempts).await
    }

    pub async fn requeue_event(
        &self,
        event_id: &str,
        dry_run: bool,
        reset_attempts: bool,
    ) -> OutboxResult<Vec<String>> {
        if event_id.trim().is_empty() {
            return Err(OutboxError::InvalidArgument("eventID is required".to_string()));
        }

        if dry_run {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM events.outbox WHERE event_id = $1 AND status = 'failed')",
            )
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
            return Ok(if exists { vec![event_id.to_string()] } else { Vec::new() });
        }

        self.requeue_event_ids(&[event_id.to_string()], reset_attempts)
            .await
    }

    async fn requeue_event_ids(
        &self,
        event_ids: &[String],
        reset_attempts: bool,
    ) -> OutboxResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut requeued = Vec::with_capacity(event_ids.len());

        for event_id in event_ids {
            let result = sqlx::query(
                r#"
                UPDATE events.outbox
                SET status = 'pending',
                    available_at = now(),
                    last_error = NULL,
                    attempts = CASE WHEN $2 THEN 0 ELSE attempts END
                WHERE event_id = $1 AND status = 'failed'
                "#,
            )
            .bind(event_id)
            .bind(reset_attempts)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                requeued.push(event_id.clone());
            }
        }

        tx.commit().await?;
        info!(count = requeued.len(), reset_attempts, "Requeued failed outbox rows");
        Ok(requeued)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplayMode {
    /// List failed outbox rows
    ListFailed,
    /// Requeue failed rows (supports dry-run)
    RequeueFailed,
    /// Requeue one failed row by event-id
    RequeueEvent,
}

#[derive(Debug, Parser)]
#[command(
    name = "outbox-replay",
    about = "Inspect and requeue failed outbox rows",
    after_help = "Examples:\n  outbox-replay --mode list-failed --limit 20\n  outbox-replay --mode requeue-failed --topic episode.published.v1 --dry-run true\n  outbox-replay --mode requeue-event --event-id evt-123 --dry-run false"
)]
pub struct ReplayArgs {
    /// Postgres database URL (falls back to DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    #[arg(long, value_enum, default_value_t = ReplayMode::ListFailed)]
    pub mode: ReplayMode,

    /// Max rows for list-failed/requeue-failed
    #[arg(long, default_value_t = 25, allow_hyphen_values = true)]
    pub limit: i64,

    /// Optional topic filter for list-failed/requeue-failed
    #[arg(long)]
    pub topic: Option<String>,

    /// Event ID for requeue-event mode
    #[arg(long)]
    pub event_id: Option<String>,

    /// Preview-only for requeue modes
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub dry_run: bool,

    /// Reset attempts to 0 when requeueing
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub reset_attempts: bool,

    /// Overall command timeout, e.g. 15s, 500ms, 2m
    #[arg(long, default_value = "15s", value_parser = parse_timeout, allow_hyphen_values = true)]
    pub timeout: Duration,
}

/// Validated replay invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
    pub database_url: String,
    pub mode: ReplayMode,
    pub limit: i64,
    pub topic: Option<String>,
    pub event_id: Option<String>,
    pub dry_run: bool,
    pub reset_attempts: bool,
    pub timeout: Duration,
}

impl ReplayArgs {
    pub fn resolve<F>(self, lookup: F) -> OutboxResult<ReplayOptions>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let database_url = non_empty(self.database_url)
            .or_else(|| non_empty(lookup("DATABASE_URL")))
            .ok_or_else(|| {
                OutboxError::InvalidArgument(
                    "database URL is required (flag --database-url or env DATABASE_URL)"
                        .to_string(),
                )
            })?;
        if self.limit <= 0 {
            return Err(OutboxError::InvalidArgument("limit must be > 0".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(OutboxError::InvalidArgument("timeout must be > 0".to_string()));
        }
        let event_id = non_empty(self.event_id);
        if self.mode == ReplayMode::RequeueEvent && event_id.is_none() {
            return Err(OutboxError::InvalidArgument(
                "event-id is required in requeue-event mode".to_string(),
            ));
        }

        Ok(ReplayOptions {
            database_url,
            mode: self.mode,
            limit: self.limit,
            topic: non_empty(self.topic),
            event_id,
            dry_run: self.dry_run,
            reset_attempts: self.reset_attempts,
            timeout: self.timeout,
        })
    }
}

/// Accepts `<n>ms`, `<n>s`, `<n>m` or a bare number of seconds.
fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit() && c != '-') {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}"))?;
    if value < 0 {
        return Ok(Duration::ZERO);
    }
    let value = value as u64;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        other => Err(format!("unsupported duration unit {other:?}")),
    }
}

/// Human-readable result of a requeue call.
pub fn render_replay_result(event_ids: &[String], dry_run: bool) -> String {
    let label = if dry_run { "candidates" } else { "requeued" };
    if event_ids.is_empty() {
        return format!("no {label} found");
    }
    let mut out = format!("{} ({}):", label, event_ids.len());
    for event_id in event_ids {
        out.push_str("\n- ");
        out.push_str(event_id);
    }
    out
}
