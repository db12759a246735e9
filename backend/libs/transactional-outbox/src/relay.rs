use event_bus::{shutdown_requested, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::error::OutboxResult;
use crate::outbox::{FlushReport, OutboxFlusher};

pub const DEFAULT_RELAY_INTERVAL: Duration = Duration::from_secs(1);

/// `OUTBOX_RELAY_INTERVAL_MS`, falling back to one second when unset,
/// unparsable or not positive.
pub fn relay_interval_from_env() -> Duration {
    relay_interval_from_lookup(|key| std::env::var(key).ok())
}

pub fn relay_interval_from_lookup<F>(lookup: F) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup("OUTBOX_RELAY_INTERVAL_MS")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|ms| *ms > 0)
        .map(|ms| Duration::from_millis(ms as u64))
        .unwrap_or(DEFAULT_RELAY_INTERVAL)
}

/// Periodic driver that drains the outbox into the bus.
pub struct OutboxRelay {
    flusher: Arc<dyn OutboxFlusher>,
    bus: Arc<dyn EventBus>,
    interval: Duration,
}

impl OutboxRelay {
    pub fn new(flusher: Arc<dyn OutboxFlusher>, bus: Arc<dyn EventBus>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_RELAY_INTERVAL
        } else {
            interval
        };
        Self {
            flusher,
            bus,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn flush_once(&self) -> OutboxResult<FlushReport> {
        self.flusher.flush(self.bus.as_ref()).await
    }

    /// Flush immediately, then once per interval until `shutdown` fires.
    ///
    /// The signal is only checked between flushes, so a pass that has
    /// started always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker = "outbox-relay",
            interval_ms = self.interval.as_millis() as u64,
            "Outbox relay starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.flush_once().await {
                error!(worker = "outbox-relay", error = %e, "Outbox flush failed");
            }
        }

        info!(worker = "outbox-relay", "Outbox relay stopped");
    }
}
