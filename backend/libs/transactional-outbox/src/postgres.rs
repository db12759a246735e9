use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_bus::{Event, ResourceCloser};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::error::OutboxResult;
use crate::store::{OutboxRow, OutboxStore};

const INSERT_SQL: &str = r#"
    INSERT INTO events.outbox (event_id, topic, payload, status, available_at)
    VALUES ($1, $2, $3, 'pending', now())
    ON CONFLICT (event_id) DO NOTHING
"#;

/// `events.outbox` on PostgreSQL.
#[derive(Clone)]
pub struct SqlxOutboxStore {
    pool: PgPool,
}

impl SqlxOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append `event` inside the caller's transaction so the business write
    /// and the outbox row commit together.
    pub async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> OutboxResult<bool> {
        let result = sqlx::query(INSERT_SQL)
            .bind(&event.id)
            .bind(&event.topic)
            .bind(&event.payload)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn row_from_pg(row: &PgRow) -> OutboxResult<OutboxRow> {
    let status: String = row.try_get("status")?;
    Ok(OutboxRow {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        topic: row.try_get("topic")?,
        payload: row.try_get("payload")?,
        status: status.parse()?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        available_at: row.try_get("available_at")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl OutboxStore for SqlxOutboxStore {
    async fn insert(&self, event: &Event) -> OutboxResult<bool> {
        let result = sqlx::query(INSERT_SQL)
            .bind(&event.id)
            .bind(&event.topic)
            .bind(&event.payload)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn pending(&self, limit: i64, now: DateTime<Utc>) -> OutboxResult<Vec<OutboxRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, topic, payload, status, attempts, last_error,
                   available_at, published_at, created_at
            FROM events.outbox
            WHERE status = 'pending' AND available_at <= $2
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Loaded pending outbox rows");
        rows.iter().map(row_from_pg).collect()
    }

    async fn mark_published(&self, id: i64) -> OutboxResult<()> {
        sqlx::query(
            r#"
            UPDATE events.outbox
            SET status = 'published',
                attempts = attempts + 1,
                last_error = NULL,
                published_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: i64,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        sqlx::query(
            r#"
            UPDATE events.outbox
            SET status = 'pending',
                attempts = attempts + 1,
                last_error = $2,
                available_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(available_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> OutboxResult<()> {
        sqlx::query(
            r#"
            UPDATE events.outbox
            SET status = 'failed',
                attempts = attempts + 1,
                last_error = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS pending,
                   COALESCE(EXTRACT(EPOCH FROM (now() - MIN(created_at)))::BIGINT, 0) AS oldest_age
            FROM events.outbox
            WHERE status = 'pending'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((row.try_get("pending")?, row.try_get("oldest_age")?))
    }
}

#[async_trait]
impl ResourceCloser for SqlxOutboxStore {
    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
