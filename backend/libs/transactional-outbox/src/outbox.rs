use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use event_bus::{Event, EventBus, ResourceCloser};
use event_schema::{dead_letter_topic, DeadLetterV1};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{OutboxError, OutboxResult};
use crate::metrics::OutboxMetrics;
use crate::store::{OutboxRow, OutboxStore};

/// Flush tuning. The retry delay is fixed, not exponential.
#[derive(Debug, Clone)]
pub struct OutboxSettings {
    pub batch_size: i64,
    pub max_attempts: i32,
    pub retry_delay: Duration,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 10,
            retry_delay: Duration::from_secs(30),
        }
    }
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub published: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.published == 0 && self.retried == 0 && self.dead_lettered == 0
    }
}

/// Anything the relay can drain into a bus.
#[async_trait]
pub trait OutboxFlusher: Send + Sync {
    async fn flush(&self, bus: &dyn EventBus) -> OutboxResult<FlushReport>;
}

/// Durable outbox: producers `add`, the relay `flush`es.
pub struct PersistentOutbox {
    store: Arc<dyn OutboxStore>,
    settings: OutboxSettings,
    metrics: Option<OutboxMetrics>,
}

impl PersistentOutbox {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self {
            store,
            settings: OutboxSettings::default(),
            metrics: None,
        }
    }

    pub fn with_settings(mut self, settings: OutboxSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &OutboxSettings {
        &self.settings
    }

    /// Append `event` as a pending row. A row with the same event ID is left untouched.
    pub async fn add(&self, event: &Event) -> OutboxResult<()> {
        if event.id.is_empty() {
            return Err(OutboxError::MissingEventId);
        }

        if self.store.insert(event).await? {
            debug!(event_id = %event.id, topic = %event.topic, "Event added to outbox");
        } else {
            debug!(event_id = %event.id, "Outbox row already exists, skipping insert");
        }
        Ok(())
    }

    /// Publish one batch of due rows.
    ///
    /// A publish failure only affects its own row. Store errors and a failed
    /// dead-letter publish abort the pass.
    pub async fn flush(&self, bus: &dyn EventBus) -> OutboxResult<FlushReport> {
        let rows = self
            .store
            .pending(self.settings.batch_size, Utc::now())
            .await?;
        let mut report = FlushReport::default();

        for row in rows {
            match bus.publish(row.to_event()).await {
                Ok(()) => {
                    self.store.mark_published(row.id).await?;
                    report.published += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.published.inc();
                    }
                }
                Err(publish_err) => {
                    let message = publish_err.to_string();
                    let attempts = row.attempts + 1;

                    if attempts >= self.settings.max_attempts {
                        self.store.mark_failed(row.id, &message).await?;
                        self.publish_dead_letter(bus, &row, &message, attempts)
                            .await?;
                        report.dead_lettered += 1;
                        if let Some(metrics) = &self.metrics {
                            metrics.dead_lettered.inc();
                        }
                        continue;
                    }

                    let available_at = Utc::now()
                        + chrono::Duration::from_std(self.settings.retry_delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                    self.store
                        .mark_retry(row.id, &message, available_at)
                        .await?;
                    report.retried += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.retried.inc();
                    }
                    debug!(
                        event_id = %row.event_id,
                        topic = %row.topic,
                        attempts = attempts,
                        error = %message,
                        "Outbox publish failed, retry scheduled"
                    );
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            if let Ok((pending, age)) = self.store.pending_stats().await {
                metrics.pending.set(pending);
                metrics.oldest_pending_age_seconds.set(age);
            }
        }

        if !report.is_empty() {
            info!(
                published = report.published,
                retried = report.retried,
                dead_lettered = report.dead_lettered,
                "Outbox flush completed"
            );
        }
        Ok(report)
    }

    async fn publish_dead_letter(
        &self,
        bus: &dyn EventBus,
        row: &OutboxRow,
        error: &str,
        attempts: i32,
    ) -> OutboxResult<()> {
        let dead_letter = DeadLetterV1 {
            event_id: row.event_id.clone(),
            original_topic: row.topic.clone(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            payload: DeadLetterV1::payload_value(&row.payload),
        };
        let event = Event::new(
            format!("{}-dlq", row.event_id),
            dead_letter_topic(&row.topic),
            serde_json::to_vec(&dead_letter)?,
        );

        bus.publish(event).await.map_err(OutboxError::DeadLetter)?;
        warn!(
            event_id = %row.event_id,
            topic = %row.topic,
            attempts = attempts,
            error = %error,
            "Outbox event exhausted retries, dead-lettered"
        );
        Ok(())
    }
}

#[async_trait]
impl OutboxFlusher for PersistentOutbox {
    async fn flush(&self, bus: &dyn EventBus) -> OutboxResult<FlushReport> {
        PersistentOutbox::flush(self, bus).await
    }
}

#[async_trait]
impl ResourceCloser for PersistentOutbox {
    async fn close(&self) -> anyhow::Result<()> {
        self.store.close().await
    }
}
