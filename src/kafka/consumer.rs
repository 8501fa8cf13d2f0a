use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::config::KafkaConfig;

/// Consumer for one pipeline topic.
///
/// All replicas share the consumer group so partitions divide between them.
/// Offsets are committed manually after each message is handled; delivery is
/// at-least-once and handlers are idempotent keyed by message id.
pub struct EventConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl EventConsumer {
    pub fn new(config: &KafkaConfig, topic: &str) -> Result<Self> {
        info!(
            brokers = %config.brokers,
            topic = topic,
            group = %config.consumer_group,
            "initializing Kafka consumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            // Manual commit after successful handling
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            // Session management
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .context("failed to create Kafka consumer")?;

        consumer
            .subscribe(&[topic])
            .context("failed to subscribe to topic")?;

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }

    /// Receive and decode the next event.
    ///
    /// A malformed payload is logged and skipped (`Ok(None)`), and its
    /// offset is committed so the broker advances past it; transport errors
    /// propagate.
    pub async fn next_event<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| anyhow::anyhow!("consumer error on {}: {}", self.topic, e))?;

        let payload = match message.payload() {
            Some(payload) => payload,
            None => {
                tracing::warn!(topic = %self.topic, "skipping event with empty payload");
                self.commit()?;
                return Ok(None);
            }
        };

        match serde_json::from_slice::<T>(payload) {
            Ok(event) => Ok(Some(event)),
            Err(e) => {
                tracing::warn!(
                    topic = %self.topic,
                    error = %e,
                    "skipping malformed event"
                );
                self.commit()?;
                Ok(None)
            }
        }
    }

    /// Commit the current position after successful handling.
    pub fn commit(&self) -> Result<()> {
        self.consumer
            .commit_consumer_state(CommitMode::Sync)
            .context("failed to commit offset")?;
        Ok(())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
