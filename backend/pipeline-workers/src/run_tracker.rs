//! Run and step log for generative-video workflows.
//!
//! Tracker writes are best-effort: the event that triggered them has already
//! been delivered, so a failed write is logged and the stage carries on.

use async_trait::async_trait;
use event_bus::ResourceCloser;
use sqlx::PgPool;
use std::fmt;
use tracing::{debug, warn};

use crate::error::TrackerError;

/// `requested -> running -> publish_queued -> completed`, with `failed`
/// reachable from any step. `completed` and `cancelled` are set outside
/// the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Requested,
    Running,
    PublishQueued,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Requested => "requested",
            RunStatus::Running => "running",
            RunStatus::PublishQueued => "publish_queued",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

#[async_trait]
pub trait RunTracker: ResourceCloser {
    async fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        last_error: &str,
    ) -> Result<(), TrackerError>;

    async fn append_run_log(
        &self,
        run_id: &str,
        step: &str,
        status: StepStatus,
        message: &str,
    ) -> Result<(), TrackerError>;
}

/// Used when no database is configured.
#[derive(Debug, Default)]
pub struct NoopRunTracker;

#[async_trait]
impl RunTracker for NoopRunTracker {
    async fn set_run_status(&self, _: &str, _: RunStatus, _: &str) -> Result<(), TrackerError> {
        Ok(())
    }

    async fn append_run_log(
        &self,
        _: &str,
        _: &str,
        _: StepStatus,
        _: &str,
    ) -> Result<(), TrackerError> {
        Ok(())
    }
}

#[async_trait]
impl ResourceCloser for NoopRunTracker {
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// `creator.workflow_runs` / `creator.workflow_run_steps`.
#[derive(Clone)]
pub struct PgRunTracker {
    pool: PgPool,
}

impl PgRunTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunTracker for PgRunTracker {
    async fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        last_error: &str,
    ) -> Result<(), TrackerError> {
        sqlx::query(
            r#"
            UPDATE creator.workflow_runs
            SET status = $2, last_error = $3, updated_at = now()
            WHERE id::text = $1
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(last_error)
        .execute(&self.pool)
        .await
        .map_err(TrackerError::Status)?;

        debug!(run_id = %run_id, status = %status, "Workflow run status updated");
        Ok(())
    }

    async fn append_run_log(
        &self,
        run_id: &str,
        step: &str,
        status: StepStatus,
        message: &str,
    ) -> Result<(), TrackerError> {
        sqlx::query(
            r#"
            INSERT INTO creator.workflow_run_steps (run_id, step, status, message)
            VALUES ($1::uuid, $2, $3, $4)
            "#,
        )
        .bind(run_id)
        .bind(step)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(TrackerError::Log)?;
        Ok(())
    }
}

#[async_trait]
impl ResourceCloser for PgRunTracker {
    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

pub async fn mark_run(tracker: &dyn RunTracker, run_id: &str, status: RunStatus, last_error: &str) {
    if let Err(e) = tracker.set_run_status(run_id, status, last_error).await {
        warn!(run_id = %run_id, status = %status, error = %e, "Run status update failed");
    }
}

pub async fn log_step(
    tracker: &dyn RunTracker,
    run_id: &str,
    step: &str,
    status: StepStatus,
    message: &str,
) {
    if let Err(e) = tracker.append_run_log(run_id, step, status, message).await {
        warn!(run_id = %run_id, step = %step, error = %e, "Run log append failed");
    }
}
