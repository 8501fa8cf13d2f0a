//! Pipeline processor: drives `inbound → moderated → persisted`.
//!
//! Two consumers share this component's lifecycle. The inbound handler asks
//! the analyzer for a verdict (falling back to a default when it is down)
//! and produces the moderated event; the moderated handler persists the
//! verdict, produces the persisted event, and signals the fan-out sink.
//! Delivery is at-least-once, so both handlers are idempotent keyed by
//! message id.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::analyzer::{AnalyzerClient, ModerateResponse, SentimentResponse};
use crate::db::{self, DbPool, MessageView};
use crate::error::AppError;
use crate::kafka::types::{
    InboundMessage, ModeratedMessage, ModerationVerdict, PersistedMessage, VerdictConfidence,
};
use crate::kafka::{EventConsumer, EventProducer};

/// Fan-out seam injected into the pipeline.
///
/// The gateway implements this; inverting the dependency keeps the
/// processor free of any knowledge of sockets or channels.
#[async_trait]
pub trait FanoutSink: Send + Sync {
    async fn emit_message_updated(&self, room_id: Uuid, message: MessageView);
}

pub struct PipelineProcessor {
    pool: DbPool,
    producer: EventProducer,
    analyzer: AnalyzerClient,
    sink: Arc<dyn FanoutSink>,
}

impl PipelineProcessor {
    pub fn new(
        pool: DbPool,
        producer: EventProducer,
        analyzer: AnalyzerClient,
        sink: Arc<dyn FanoutSink>,
    ) -> Self {
        Self {
            pool,
            producer,
            analyzer,
            sink,
        }
    }

    /// Consume `messages.inbound` forever.
    pub async fn run_inbound(&self, consumer: EventConsumer) {
        loop {
            match consumer.next_event::<InboundMessage>().await {
                Ok(Some(inbound)) => {
                    if let Err(e) = inbound.validate() {
                        tracing::warn!(topic = consumer.topic(), error = %e, "skipping invalid inbound event");
                        if let Err(e) = consumer.commit() {
                            tracing::error!(error = %e, "offset commit failed");
                        }
                        continue;
                    }
                    match self.handle_inbound(&inbound).await {
                        Ok(()) => {
                            if let Err(e) = consumer.commit() {
                                tracing::error!(error = %e, "offset commit failed");
                            }
                        }
                        Err(e) => {
                            // uncommitted; the broker's redelivery governs retry
                            tracing::error!(message_id = %inbound.id, error = %e, "inbound handling failed");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "inbound consumer error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Consume `messages.moderated` forever.
    pub async fn run_moderated(&self, consumer: EventConsumer) {
        loop {
            match consumer.next_event::<ModeratedMessage>().await {
                Ok(Some(moderated)) => {
                    if let Err(e) = moderated.validate() {
                        tracing::warn!(topic = consumer.topic(), error = %e, "skipping invalid moderated event");
                        if let Err(e) = consumer.commit() {
                            tracing::error!(error = %e, "offset commit failed");
                        }
                        continue;
                    }
                    match self.handle_moderated(&moderated).await {
                        Ok(()) => {
                            if let Err(e) = consumer.commit() {
                                tracing::error!(error = %e, "offset commit failed");
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                message_id = %moderated.inbound.id,
                                error = %e,
                                "moderated handling failed"
                            );
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "moderated consumer error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_inbound(&self, inbound: &InboundMessage) -> Result<()> {
        let moderate = self.analyzer.moderate(&inbound.id, &inbound.body).await;
        let sentiment = self.analyzer.sentiment(&inbound.id, &inbound.body).await;
        let verdict = merge_verdict(&inbound.id, moderate, sentiment);

        let moderated = ModeratedMessage {
            inbound: inbound.clone(),
            moderation: verdict,
            processed_at: Utc::now().timestamp_millis(),
        };
        self.producer.produce_moderated(&moderated).await?;
        Ok(())
    }

    async fn handle_moderated(&self, moderated: &ModeratedMessage) -> Result<()> {
        let message_id = match Uuid::parse_str(&moderated.inbound.id) {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(message_id = %moderated.inbound.id, "moderated event with non-uuid id, skipping");
                return Ok(());
            }
        };

        let row = db::update_message_moderation(
            &self.pool,
            &message_id,
            moderated.moderation.sentiment.as_str(),
            moderated.moderation.flagged,
            &moderated.moderation.reasons,
        )
        .await?;

        let row = match row {
            Some(row) => row,
            None => {
                // id absent: the document never landed or was purged
                tracing::warn!(message_id = %message_id, "no document for moderated event, skipping");
                return Ok(());
            }
        };

        let persisted = PersistedMessage {
            moderated: moderated.clone(),
            doc_id: row.id.to_string(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        self.producer.produce_persisted(&persisted).await?;

        let room_id = row.room_id;
        self.sink.emit_message_updated(room_id, row.into_view()).await;
        Ok(())
    }
}

/// Combine the two analyzer calls into one verdict. Any analyzer failure
/// yields the default verdict so the pipeline always advances.
fn merge_verdict(
    message_id: &str,
    moderate: Result<ModerateResponse, AppError>,
    sentiment: Result<SentimentResponse, AppError>,
) -> ModerationVerdict {
    match (moderate, sentiment) {
        (Ok(moderate), Ok(sentiment)) => ModerationVerdict {
            sentiment: sentiment.sentiment,
            flagged: moderate.flagged,
            reasons: moderate.reasons.unwrap_or_default(),
            confidence: VerdictConfidence {
                sentiment: sentiment.confidence.unwrap_or(0.5),
                flagged: moderate.confidence.unwrap_or(0.5),
            },
        },
        (moderate, sentiment) => {
            if let Err(e) = &moderate {
                tracing::warn!(message_id = %message_id, error = %e, "moderation call failed");
            }
            if let Err(e) = &sentiment {
                tracing::warn!(message_id = %message_id, error = %e, "sentiment call failed");
            }
            ModerationVerdict::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::types::Sentiment;

    #[test]
    fn merge_uses_both_analyzer_responses() {
        let verdict = merge_verdict(
            "m1",
            Ok(ModerateResponse {
                flagged: true,
                reasons: Some(vec!["toxicity".to_string()]),
                confidence: Some(0.9),
            }),
            Ok(SentimentResponse {
                sentiment: Sentiment::Negative,
                confidence: Some(0.8),
            }),
        );
        assert_eq!(verdict.sentiment, Sentiment::Negative);
        assert!(verdict.flagged);
        assert_eq!(verdict.reasons, vec!["toxicity"]);
        assert_eq!(verdict.confidence.flagged, 0.9);
        assert_eq!(verdict.confidence.sentiment, 0.8);
    }

    #[test]
    fn merge_defaults_missing_confidence() {
        let verdict = merge_verdict(
            "m1",
            Ok(ModerateResponse {
                flagged: false,
                reasons: None,
                confidence: None,
            }),
            Ok(SentimentResponse {
                sentiment: Sentiment::Positive,
                confidence: None,
            }),
        );
        assert_eq!(verdict.confidence.sentiment, 0.5);
        assert_eq!(verdict.confidence.flagged, 0.5);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn any_analyzer_failure_yields_the_fallback_verdict() {
        let failure = || AppError::internal("analyzer down");

        let verdict = merge_verdict(
            "m1",
            Err(failure()),
            Ok(SentimentResponse {
                sentiment: Sentiment::Positive,
                confidence: Some(0.99),
            }),
        );
        assert_eq!(verdict.sentiment, Sentiment::Neutral);
        assert!(!verdict.flagged);
        assert_eq!(verdict.confidence.sentiment, 0.5);

        let verdict = merge_verdict(
            "m1",
            Ok(ModerateResponse {
                flagged: true,
                reasons: None,
                confidence: Some(0.99),
            }),
            Err(failure()),
        );
        assert_eq!(verdict.sentiment, Sentiment::Neutral);
        assert!(!verdict.flagged);
    }
}
