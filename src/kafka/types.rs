//! Topic payload contracts for the three pipeline stages.
//!
//! Each later stage embeds the prior one by composition, so the wire shape
//! of `messages.moderated` is the inbound fields plus the moderation block,
//! and `messages.persisted` adds the document identity on top of that.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TOPIC_INBOUND: &str = "messages.inbound";
pub const TOPIC_MODERATED: &str = "messages.moderated";
pub const TOPIC_PERSISTED: &str = "messages.persisted";

/// Event type marker carried by every stage
pub const EVENT_MESSAGE_SENT: &str = "message.sent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// Stage 1: the client-submitted message as accepted by the write path.
///
/// Carries the raw client body: the analyzer must see the text before
/// sanitization rewrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub body: String,
    /// Millisecond timestamp of submission
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl InboundMessage {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("id is required");
        }
        if self.room_id.is_empty() {
            anyhow::bail!("roomId is required");
        }
        if self.sender_id.is_empty() {
            anyhow::bail!("senderId is required");
        }
        if self.body.is_empty() {
            anyhow::bail!("body is required");
        }
        if self.timestamp <= 0 {
            anyhow::bail!("timestamp must be positive");
        }
        if self.event_type != EVENT_MESSAGE_SENT {
            anyhow::bail!("unexpected event type: {}", self.event_type);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictConfidence {
    pub sentiment: f64,
    pub flagged: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub sentiment: Sentiment,
    pub flagged: bool,
    pub reasons: Vec<String>,
    pub confidence: VerdictConfidence,
}

impl ModerationVerdict {
    /// The verdict used whenever the analyzer is unavailable, so the
    /// pipeline always advances.
    pub fn fallback() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            flagged: false,
            reasons: vec![],
            confidence: VerdictConfidence {
                sentiment: 0.5,
                flagged: 0.5,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidence.sentiment", self.confidence.sentiment),
            ("confidence.flagged", self.confidence.flagged),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} out of range: {}", name, value);
            }
        }
        Ok(())
    }
}

/// Stage 2: inbound fields plus the analyzer verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeratedMessage {
    #[serde(flatten)]
    pub inbound: InboundMessage,
    pub moderation: ModerationVerdict,
    /// Millisecond timestamp the verdict was produced
    pub processed_at: i64,
}

impl ModeratedMessage {
    pub fn validate(&self) -> Result<()> {
        self.inbound.validate()?;
        self.moderation.validate()?;
        if self.processed_at <= 0 {
            anyhow::bail!("processedAt must be positive");
        }
        Ok(())
    }
}

/// Stage 3: moderated fields plus the persisted document identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMessage {
    #[serde(flatten)]
    pub moderated: ModeratedMessage,
    #[serde(rename = "_id")]
    pub doc_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedMessage {
    pub fn validate(&self) -> Result<()> {
        self.moderated.validate()?;
        if self.doc_id.is_empty() {
            anyhow::bail!("_id is required");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> InboundMessage {
        InboundMessage {
            id: "msg-1".to_string(),
            room_id: "room-1".to_string(),
            sender_id: "user-1".to_string(),
            body: "hello".to_string(),
            timestamp: 1_700_000_000_000,
            event_type: EVENT_MESSAGE_SENT.to_string(),
        }
    }

    #[test]
    fn inbound_validates_required_fields() {
        assert!(inbound().validate().is_ok());

        let mut bad = inbound();
        bad.id = String::new();
        assert!(bad.validate().is_err());

        let mut bad = inbound();
        bad.event_type = "message.edited".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn fallback_verdict_matches_contract() {
        let v = ModerationVerdict::fallback();
        assert_eq!(v.sentiment, Sentiment::Neutral);
        assert!(!v.flagged);
        assert!(v.reasons.is_empty());
        assert_eq!(v.confidence.sentiment, 0.5);
        assert_eq!(v.confidence.flagged, 0.5);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn moderated_rejects_out_of_range_confidence() {
        let mut m = ModeratedMessage {
            inbound: inbound(),
            moderation: ModerationVerdict::fallback(),
            processed_at: 1_700_000_000_500,
        };
        assert!(m.validate().is_ok());
        m.moderation.confidence.flagged = 1.5;
        assert!(m.validate().is_err());
    }

    #[test]
    fn stages_flatten_on_the_wire() {
        let moderated = ModeratedMessage {
            inbound: inbound(),
            moderation: ModerationVerdict::fallback(),
            processed_at: 1_700_000_000_500,
        };
        let value = serde_json::to_value(&moderated).unwrap();
        // inbound fields sit at the top level, not nested
        assert_eq!(value["id"], "msg-1");
        assert_eq!(value["roomId"], "room-1");
        assert_eq!(value["type"], "message.sent");
        assert_eq!(value["moderation"]["sentiment"], "neutral");
        assert_eq!(value["processedAt"], 1_700_000_000_500i64);
    }

    #[test]
    fn persisted_round_trips() {
        let persisted = PersistedMessage {
            moderated: ModeratedMessage {
                inbound: inbound(),
                moderation: ModerationVerdict::fallback(),
                processed_at: 1_700_000_000_500,
            },
            doc_id: "msg-1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(persisted.validate().is_ok());

        let json = serde_json::to_string(&persisted).unwrap();
        let back: PersistedMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.doc_id, "msg-1");
        assert_eq!(back.moderated.inbound.body, "hello");
    }
}
