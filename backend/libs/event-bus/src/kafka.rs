//! Durable Kafka-backed bus.
//!
//! - `publish` writes to a topic named after `event.topic`, keyed by the topic
//!   so every event of a topic lands on one partition (per-topic ordering).
//! - `subscribe` opens a consumer group named after the consumer with manual
//!   commits. Handler success commits the offset; handler failure seeks back
//!   to the same offset so the broker redelivers it.
//! - The dedup identity travels in the `event_id` header. Messages without it
//!   get a synthetic ID derived from topic, partition and offset so
//!   redeliveries of the same message keep the same ID.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{shutdown_requested, BusError, BusResult, Event, EventBus, EventHandler, ResourceCloser};

/// Header carrying the event ID.
pub const EVENT_ID_HEADER: &str = "event_id";

/// Connection settings for [`KafkaBus`].
#[derive(Debug, Clone)]
pub struct KafkaBusConfig {
    pub brokers: String,
    pub client_id: String,
    /// Upper bound for a single produce call
    pub delivery_timeout: Duration,
    /// Pause before a rejected message is fetched again
    pub redelivery_delay: Duration,
}

impl KafkaBusConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            client_id: "media-pipeline".to_string(),
            delivery_timeout: Duration::from_secs(30),
            redelivery_delay: Duration::from_secs(1),
        }
    }

    /// Load from environment. Returns `None` when `KAFKA_BROKERS` is unset or blank.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let brokers = lookup("KAFKA_BROKERS")?;
        if brokers.trim().is_empty() {
            return None;
        }

        let mut config = Self::new(brokers.trim());
        if let Some(client_id) = lookup("KAFKA_CLIENT_ID").filter(|v| !v.trim().is_empty()) {
            config.client_id = client_id;
        }
        Some(config)
    }
}

/// Dedup ID for messages published without an `event_id` header.
pub fn synthetic_event_id(topic: &str, partition: i32, offset: i64) -> String {
    format!("{}-{}-{}", topic, partition, offset)
}

struct SubscriptionHandle {
    topic: String,
    consumer: String,
    task: JoinHandle<()>,
}

pub struct KafkaBus {
    config: KafkaBusConfig,
    producer: FutureProducer,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    close_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl KafkaBus {
    /// Create the bus and its idempotent producer.
    pub fn new(config: KafkaBusConfig) -> BusResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .create()?;

        info!(
            brokers = %config.brokers,
            client_id = %config.client_id,
            "Kafka event bus connected"
        );

        let (close_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            producer,
            subscriptions: Mutex::new(Vec::new()),
            close_tx,
            closed: AtomicBool::new(false),
        })
    }

    fn create_consumer(&self, consumer: &str) -> KafkaResult<StreamConsumer> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("client.id", &self.config.client_id)
            .set("group.id", consumer)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()
    }
}

#[async_trait]
impl EventBus for KafkaBus {
    async fn publish(&self, event: Event) -> BusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let mut headers = OwnedHeaders::new();
        if !event.id.is_empty() {
            headers = headers.insert(Header {
                key: EVENT_ID_HEADER,
                value: Some(event.id.as_bytes()),
            });
        }

        let record = FutureRecord::to(&event.topic)
            .key(event.topic.as_str())
            .payload(event.payload.as_slice())
            .headers(headers);

        let (partition, offset) = self
            .producer
            .send(record, self.config.delivery_timeout)
            .await
            .map_err(|(err, _)| BusError::Kafka(err))?;

        debug!(
            event_id = %event.id,
            topic = %event.topic,
            partition = partition,
            offset = offset,
            "Event published to Kafka"
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        consumer: &str,
        handler: Arc<dyn EventHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> BusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let stream = self.create_consumer(consumer)?;
        stream.subscribe(&[topic])?;

        let worker = SubscriptionWorker {
            topic: topic.to_string(),
            consumer_name: consumer.to_string(),
            consumer: stream,
            handler,
            shutdown,
            closed: self.close_tx.subscribe(),
            redelivery_delay: self.config.redelivery_delay,
        };
        let task = tokio::spawn(worker.run());

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SubscriptionHandle {
                topic: topic.to_string(),
                consumer: consumer.to_string(),
                task,
            });

        info!(topic = %topic, consumer = %consumer, "Durable subscription started");
        Ok(())
    }
}

#[async_trait]
impl ResourceCloser for KafkaBus {
    /// Drain every subscription, then flush the producer.
    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.close_tx.send(true);

        let handles = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.task.await {
                warn!(
                    topic = %handle.topic,
                    consumer = %handle.consumer,
                    error = %e,
                    "Subscription task ended abnormally"
                );
            }
        }

        self.producer.flush(self.config.delivery_timeout)?;
        info!("Kafka event bus closed");
        Ok(())
    }
}

/// Owned copy of a delivered message. Extracted before the handler runs so
/// no borrowed broker message lives across an await point.
struct Delivery {
    event: Event,
    partition: i32,
    offset: i64,
}

impl Delivery {
    fn from_message(message: &BorrowedMessage<'_>) -> Self {
        let topic = message.topic().to_string();
        let header_id = message.headers().and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == EVENT_ID_HEADER)
                .and_then(|header| header.value)
                .and_then(|value| std::str::from_utf8(value).ok())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        });
        let id = header_id.unwrap_or_else(|| {
            synthetic_event_id(&topic, message.partition(), message.offset())
        });

        Self {
            event: Event {
                id,
                topic,
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            },
            partition: message.partition(),
            offset: message.offset(),
        }
    }
}

struct SubscriptionWorker {
    topic: String,
    consumer_name: String,
    consumer: StreamConsumer,
    handler: Arc<dyn EventHandler>,
    shutdown: watch::Receiver<bool>,
    closed: watch::Receiver<bool>,
    redelivery_delay: Duration,
}

impl SubscriptionWorker {
    async fn run(mut self) {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                _ = shutdown_requested(&mut self.closed) => break,
                received = self.consumer.recv() => match received {
                    Ok(message) => Delivery::from_message(&message),
                    Err(e) => {
                        error!(
                            topic = %self.topic,
                            consumer = %self.consumer_name,
                            error = %e,
                            "Kafka receive error"
                        );
                        tokio::time::sleep(self.redelivery_delay).await;
                        continue;
                    }
                },
            };

            self.deliver(delivery).await;
        }

        info!(
            topic = %self.topic,
            consumer = %self.consumer_name,
            "Subscription drained"
        );
    }

    async fn deliver(&self, delivery: Delivery) {
        match self.handler.handle(&delivery.event).await {
            Ok(()) => {
                if let Err(e) = self.acknowledge(&delivery) {
                    warn!(
                        event_id = %delivery.event.id,
                        topic = %self.topic,
                        error = %e,
                        "Failed to commit Kafka offset"
                    );
                }
            }
            Err(e) => {
                warn!(
                    event_id = %delivery.event.id,
                    topic = %self.topic,
                    consumer = %self.consumer_name,
                    error = %e,
                    "Handler rejected event, scheduling redelivery"
                );
                if let Err(seek_err) = self.consumer.seek(
                    &delivery.event.topic,
                    delivery.partition,
                    Offset::Offset(delivery.offset),
                    Duration::from_secs(5),
                ) {
                    error!(
                        event_id = %delivery.event.id,
                        error = %seek_err,
                        "Failed to rewind for redelivery"
                    );
                }
                tokio::time::sleep(self.redelivery_delay).await;
            }
        }
    }

    fn acknowledge(&self, delivery: &Delivery) -> KafkaResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &delivery.event.topic,
            delivery.partition,
            Offset::Offset(delivery.offset + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Sync)
    }
}
