use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::KafkaConfig;

use super::types::{
    InboundMessage, ModeratedMessage, PersistedMessage, TOPIC_INBOUND, TOPIC_MODERATED,
    TOPIC_PERSISTED,
};

/// Typed producer for the three pipeline topics.
///
/// Configured for at-least-once delivery:
/// - `acks=all`: wait for all in-sync replicas
/// - `enable.idempotence=true`: no duplicates within a producer session
/// - message id as key, so per-message ordering survives partitioning
pub struct EventProducer {
    producer: Arc<FutureProducer>,
}

impl EventProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!(brokers = %config.brokers, "initializing Kafka producer");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            // Reliability
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5")
            // Performance
            .set("compression.type", "snappy")
            .set("linger.ms", "10")
            // Timeouts
            .set("request.timeout.ms", "30000")
            .set("delivery.timeout.ms", "120000")
            .create()
            .context("failed to create Kafka producer")?;

        Ok(Self {
            producer: Arc::new(producer),
        })
    }

    /// Publish the stage-1 event. Validation failure aborts the produce.
    pub async fn produce_inbound(&self, event: &InboundMessage) -> Result<()> {
        event.validate().context("invalid inbound payload")?;
        self.send(TOPIC_INBOUND, &event.id, event).await
    }

    /// Publish the stage-2 event. Validation failure aborts the produce.
    pub async fn produce_moderated(&self, event: &ModeratedMessage) -> Result<()> {
        event.validate().context("invalid moderated payload")?;
        self.send(TOPIC_MODERATED, &event.inbound.id, event).await
    }

    /// Publish the stage-3 event. Validation failure aborts the produce.
    pub async fn produce_persisted(&self, event: &PersistedMessage) -> Result<()> {
        event.validate().context("invalid persisted payload")?;
        self.send(TOPIC_PERSISTED, &event.moderated.inbound.id, event)
            .await
    }

    async fn send<T: Serialize>(&self, topic: &str, key: &str, event: &T) -> Result<()> {
        let payload = serde_json::to_vec(event).context("failed to serialize event")?;

        let record = FutureRecord::to(topic).key(key).payload(&payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = topic,
                    key = key,
                    partition = partition,
                    offset = offset,
                    "event produced"
                );
                Ok(())
            }
            Err((kafka_err, _)) => {
                tracing::error!(
                    topic = topic,
                    key = key,
                    error = %kafka_err,
                    "failed to produce event"
                );
                Err(anyhow::anyhow!("Kafka send failed: {}", kafka_err))
            }
        }
    }

    /// Flush in-flight messages. Called before shutdown.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer
            .flush(Timeout::After(timeout))
            .context("failed to flush Kafka producer")?;
        Ok(())
    }
}

impl Clone for EventProducer {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}
