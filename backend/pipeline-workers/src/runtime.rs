//! Wiring for the `pipeline-worker` binary.
//!
//! One process runs one processor. Startup resolves the bus, the guard and
//! the processor's collaborators once; shutdown drains the bus first and then
//! closes every collaborator that holds a connection.

use clap::ValueEnum;
use event_bus::{shutdown_requested, EventBus, ResourceCloser};
use idempotent_consumer::{GuardBackend, IdempotencyGuard};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::catalog::catalog_projector_for;
use crate::config::{connect_optional, WorkerConfig};
use crate::processors::{
    gen_nim, gen_orchestrator, gen_qc, ingest, policy, publish, transcode, GenNimProcessor,
    GenOrchestratorProcessor, GenQcProcessor, IngestProcessor, PolicyProcessor, PublishProcessor,
    TranscodeProcessor,
};
use crate::profiles::model_profile_reader_for;
use crate::provider::DefaultProviderFactory;
use crate::run_tracker::{NoopRunTracker, PgRunTracker, RunTracker};
use crate::stage::{stage_handler, StageProcessor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkerKind {
    Ingest,
    Transcode,
    Policy,
    Publish,
    GenOrchestrator,
    GenNim,
    GenQc,
}

impl WorkerKind {
    /// Durable consumer name and idempotency scope.
    pub fn consumer(self) -> &'static str {
        match self {
            WorkerKind::Ingest => ingest::CONSUMER,
            WorkerKind::Transcode => transcode::CONSUMER,
            WorkerKind::Policy => policy::CONSUMER,
            WorkerKind::Publish => publish::CONSUMER,
            WorkerKind::GenOrchestrator => gen_orchestrator::CONSUMER,
            WorkerKind::GenNim => gen_nim::CONSUMER,
            WorkerKind::GenQc => gen_qc::CONSUMER,
        }
    }

    fn tracks_runs(self) -> bool {
        matches!(
            self,
            WorkerKind::GenOrchestrator | WorkerKind::GenNim | WorkerKind::GenQc
        )
    }
}

pub struct WorkerRuntime {
    bus: Arc<dyn EventBus>,
    processor: Arc<dyn StageProcessor>,
    closers: Vec<Arc<dyn ResourceCloser>>,
}

impl WorkerRuntime {
    /// Assemble a processor with explicit collaborators.
    pub fn new(
        bus: Arc<dyn EventBus>,
        processor: Arc<dyn StageProcessor>,
        closers: Vec<Arc<dyn ResourceCloser>>,
    ) -> Self {
        Self {
            bus,
            processor,
            closers,
        }
    }

    /// Resolve every collaborator of `kind` from `config`.
    pub async fn build(
        kind: WorkerKind,
        config: &WorkerConfig,
        bus: Arc<dyn EventBus>,
    ) -> anyhow::Result<Self> {
        let consumer = kind.consumer();
        let guard = Arc::new(
            IdempotencyGuard::scoped(consumer, config.persistence, config.database.clone())
                .await?,
        );
        if guard.backend() == GuardBackend::Ephemeral {
            info!(worker = consumer, "Idempotency keys are process-local");
        }

        let mut closers: Vec<Arc<dyn ResourceCloser>> = Vec::new();
        closers.push(guard.clone());

        let pool = if kind.tracks_runs() {
            connect_optional(consumer, config.persistence, config.database.clone()).await?
        } else {
            None
        };
        let tracker: Arc<dyn RunTracker> = match &pool {
            Some(pool) => {
                let tracker = Arc::new(PgRunTracker::new(pool.clone()));
                closers.push(tracker.clone());
                tracker
            }
            None => Arc::new(NoopRunTracker),
        };

        let processor: Arc<dyn StageProcessor> = match kind {
            WorkerKind::Ingest => Arc::new(IngestProcessor::new(bus.clone(), guard)),
            WorkerKind::Transcode => Arc::new(TranscodeProcessor::new(bus.clone(), guard)),
            WorkerKind::Policy => Arc::new(PolicyProcessor::new(bus.clone(), guard)),
            WorkerKind::Publish => {
                let projector = catalog_projector_for(config.catalog_url.as_ref())?;
                Arc::new(PublishProcessor::new(bus.clone(), guard, projector))
            }
            WorkerKind::GenOrchestrator => {
                Arc::new(GenOrchestratorProcessor::new(bus.clone(), guard, tracker))
            }
            WorkerKind::GenNim => {
                let profiles = model_profile_reader_for(pool, config.persistence)?;
                Arc::new(GenNimProcessor::new(
                    bus.clone(),
                    guard,
                    profiles,
                    Arc::new(DefaultProviderFactory),
                    tracker,
                ))
            }
            WorkerKind::GenQc => Arc::new(GenQcProcessor::new(bus.clone(), guard, tracker)),
        };

        Ok(Self::new(bus, processor, closers))
    }

    pub fn processor(&self) -> &Arc<dyn StageProcessor> {
        &self.processor
    }

    /// Subscribe, wait for `shutdown`, then drain and release resources.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let topic = self.processor.topic();
        let consumer = self.processor.consumer();

        self.bus
            .subscribe(
                topic,
                consumer,
                stage_handler(self.processor.clone()),
                shutdown.clone(),
            )
            .await?;
        info!(worker = consumer, topic = topic, "Worker started");

        shutdown_requested(&mut shutdown).await;
        info!(worker = consumer, "Shutdown signal received, draining");

        self.bus.close().await?;
        for closer in &self.closers {
            if let Err(e) = closer.close().await {
                error!(worker = consumer, error = %e, "Failed to close resource");
            }
        }

        info!(worker = consumer, "Worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{Event, InMemoryBus};
    use event_schema::topics;
    use idempotent_consumer::PersistenceMode;

    fn lenient_config() -> WorkerConfig {
        WorkerConfig {
            persistence: PersistenceMode::Lenient,
            database: None,
            catalog_url: None,
        }
    }

    #[test]
    fn test_worker_names() {
        assert_eq!(
            WorkerKind::from_str("gen-orchestrator", false),
            Ok(WorkerKind::GenOrchestrator)
        );
        assert_eq!(WorkerKind::GenNim.consumer(), "worker-gen-nim");
        assert_eq!(WorkerKind::Ingest.consumer(), "worker-ingest");
        assert!(WorkerKind::from_str("gen-cleanup", false).is_err());
    }

    #[tokio::test]
    async fn test_every_worker_builds_without_database() {
        for kind in WorkerKind::value_variants() {
            let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
            let runtime = WorkerRuntime::build(*kind, &lenient_config(), bus)
                .await
                .unwrap();
            assert_eq!(runtime.processor().consumer(), kind.consumer());
        }
    }

    #[tokio::test]
    async fn test_strict_mode_without_database_fails() {
        let config = WorkerConfig {
            persistence: PersistenceMode::Strict,
            ..lenient_config()
        };
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        assert!(WorkerRuntime::build(WorkerKind::Ingest, &config, bus)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_run_subscribes_until_shutdown() {
        let bus = Arc::new(InMemoryBus::new());
        let runtime =
            WorkerRuntime::build(WorkerKind::Ingest, &lenient_config(), bus.clone())
                .await
                .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runtime.run(rx));
        while bus.handler_count(topics::MEDIA_UPLOADED) == 0 {
            tokio::task::yield_now().await;
        }

        bus.publish(Event::new(
            "evt1",
            topics::MEDIA_UPLOADED,
            br#"{"asset_id":"a","source_url":"https://cdn/a.mp4","uploader_id":"u","trace_id":"t"}"#
                .to_vec(),
        ))
        .await
        .unwrap();

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
