use std::sync::Arc;

use tracing::warn;

use crate::{BusResult, EventBus, InMemoryBus, KafkaBus, KafkaBusConfig};

/// Build the bus described by the environment.
///
/// `KAFKA_BROKERS` selects the durable bus. Without it the process gets an
/// in-process bus, which only reaches subscribers in the same process.
pub fn bus_from_env() -> BusResult<Arc<dyn EventBus>> {
    bus_from_config(KafkaBusConfig::from_env())
}

pub fn bus_from_config(config: Option<KafkaBusConfig>) -> BusResult<Arc<dyn EventBus>> {
    match config {
        Some(config) => Ok(Arc::new(KafkaBus::new(config)?)),
        None => {
            warn!("KAFKA_BROKERS not set, using in-process event bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
    }
}
