use prometheus::core::Collector;
use prometheus::{IntCounter, IntGauge, Opts, Registry};
use tracing::warn;

#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub published: IntCounter,
    pub retried: IntCounter,
    pub dead_lettered: IntCounter,
}

impl OutboxMetrics {
    /// Metrics registered on the process-wide default registry.
    pub fn new(service: &str) -> prometheus::Result<Self> {
        Self::with_registry(prometheus::default_registry(), service)
    }

    pub fn with_registry(registry: &Registry, service: &str) -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help).const_label("service", service.to_string())
        };

        let metrics = Self {
            pending: IntGauge::with_opts(opts(
                "outbox_pending_count",
                "Number of unpublished outbox events currently pending",
            ))?,
            oldest_pending_age_seconds: IntGauge::with_opts(opts(
                "outbox_oldest_pending_age_seconds",
                "Age in seconds of the oldest pending outbox event",
            ))?,
            published: IntCounter::with_opts(opts(
                "outbox_published_total",
                "Total number of outbox events marked as published",
            ))?,
            retried: IntCounter::with_opts(opts(
                "outbox_retried_total",
                "Total number of failed publishes scheduled for retry",
            ))?,
            dead_lettered: IntCounter::with_opts(opts(
                "outbox_dead_lettered_total",
                "Total number of outbox events moved to the dead-letter topic",
            ))?,
        };

        for metric in [
            Box::new(metrics.pending.clone()) as Box<dyn Collector>,
            Box::new(metrics.oldest_pending_age_seconds.clone()),
            Box::new(metrics.published.clone()),
            Box::new(metrics.retried.clone()),
            Box::new(metrics.dead_lettered.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register outbox metric: {}", e);
            }
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_on_custom_registry() {
        let registry = Registry::new();
        let metrics = OutboxMetrics::with_registry(&registry, "outbox-relay").unwrap();
        metrics.published.inc();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"outbox_published_total".to_string()));
        assert!(names.contains(&"outbox_dead_lettered_total".to_string()));
    }

    #[test]
    fn test_duplicate_registration_is_not_fatal() {
        let registry = Registry::new();
        OutboxMetrics::with_registry(&registry, "outbox-relay").unwrap();
        assert!(OutboxMetrics::with_registry(&registry, "outbox-relay").is_ok());
    }
}
