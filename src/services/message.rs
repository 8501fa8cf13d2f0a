//! Message write-path and history read-path.
//!
//! The write path is admission → sanitize → store → cache → produce. The
//! inbound topic carries the client-submitted body (the analyzer sees raw
//! text); the document store, cache, and fan-out carry the sanitized body.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::cache::MessageCache;
use crate::db::{self, DbPool, MessageView};
use crate::error::{AppError, AppResult};
use crate::kafka::types::{InboundMessage, EVENT_MESSAGE_SENT};
use crate::kafka::EventProducer;
use crate::rate_limit::{RateLimitKind, RateLimiter};
use crate::sanitize::sanitize_message_body;
use crate::services::{clamp_page, Paginated};

const MAX_BODY_CHARS: usize = 2000;

#[derive(Clone)]
pub struct MessageService {
    pool: DbPool,
    limiter: RateLimiter,
    cache: MessageCache,
    producer: EventProducer,
}

impl MessageService {
    pub fn new(
        pool: DbPool,
        limiter: RateLimiter,
        cache: MessageCache,
        producer: EventProducer,
    ) -> Self {
        Self {
            pool,
            limiter,
            cache,
            producer,
        }
    }

    /// Accept a message: rate-limit, authorize, sanitize, persist, cache,
    /// and hand the raw body to the pipeline.
    ///
    /// Cache and produce failures are logged and swallowed once the row is
    /// written; the client's write has already succeeded.
    pub async fn send(
        &self,
        room_id: &Uuid,
        body: &str,
        sender: &Uuid,
        client_ip: Option<&str>,
    ) -> AppResult<MessageView> {
        let decision = self
            .limiter
            .check(RateLimitKind::MessageUser, &sender.to_string())
            .await;
        if !decision.allowed {
            return Err(AppError::RateLimited {
                retry_after: decision.retry_after,
            });
        }
        if let Some(ip) = client_ip {
            let decision = self.limiter.check(RateLimitKind::MessageIp, ip).await;
            if !decision.allowed {
                return Err(AppError::RateLimited {
                    retry_after: decision.retry_after,
                });
            }
        }

        db::get_room(&self.pool, room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room not found"))?;
        if db::get_member(&self.pool, room_id, sender).await?.is_none() {
            return Err(AppError::forbidden("not a member of this room"));
        }

        let sanitized = validate_body(body)?;

        let row = db::insert_message(&self.pool, room_id, sender, &sanitized).await?;
        let view = row.into_view();

        if let Err(e) = self.cache.prepend(room_id, &view).await {
            tracing::warn!(room_id = %room_id, error = %e, "hot-cache prepend failed");
        }

        // Raw body on purpose: the analyzer moderates what the client wrote
        let inbound = InboundMessage {
            id: view.id.to_string(),
            room_id: room_id.to_string(),
            sender_id: sender.to_string(),
            body: body.to_string(),
            timestamp: view.created_at.timestamp_millis(),
            event_type: EVENT_MESSAGE_SENT.to_string(),
        };
        if let Err(e) = self.producer.produce_inbound(&inbound).await {
            tracing::warn!(
                message_id = %view.id,
                error = %e,
                "inbound produce failed after write; pipeline will not see this message"
            );
        }

        Ok(view)
    }

    /// Paginated history, newest first. The first page is served from the
    /// hot cache when possible; a cursor narrows to rows strictly older
    /// than the cursor's created-at.
    pub async fn list(
        &self,
        room_id: &Uuid,
        page: Option<i64>,
        limit: Option<i64>,
        cursor_ms: Option<i64>,
        caller: &Uuid,
    ) -> AppResult<Paginated<MessageView>> {
        db::get_room(&self.pool, room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room not found"))?;
        if db::get_member(&self.pool, room_id, caller).await?.is_none() {
            return Err(AppError::forbidden("not a member of this room"));
        }

        let (page, limit) = clamp_page(page, limit);
        let cursor = cursor_ms.and_then(cursor_from_ms);

        if page == 1 && cursor.is_none() {
            match self.cache.get_recent(room_id).await {
                Ok(Some(cached)) => {
                    let items: Vec<MessageView> =
                        cached.into_iter().take(limit as usize).collect();
                    let total = match db::count_messages(&self.pool, room_id).await {
                        Ok(total) => total,
                        Err(e) => {
                            tracing::warn!(room_id = %room_id, error = %e, "history count failed, using cache size");
                            items.len() as i64
                        }
                    };
                    return Ok(Paginated::new(items, total, page, limit));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(room_id = %room_id, error = %e, "hot-cache read failed");
                }
            }
        }

        let offset = if cursor.is_some() { 0 } else { (page - 1) * limit };
        let rows = db::list_messages(&self.pool, room_id, limit, offset, cursor).await?;
        let total = db::count_messages(&self.pool, room_id).await?;
        let items: Vec<MessageView> = rows.into_iter().map(|r| r.into_view()).collect();

        if page == 1 && cursor.is_none() {
            if let Err(e) = self.cache.cache_recent(room_id, &items).await {
                tracing::warn!(room_id = %room_id, error = %e, "hot-cache refresh failed");
            }
        }

        Ok(Paginated::new(items, total, page, limit))
    }

    /// Edit a message body; sender only.
    pub async fn update(&self, message_id: &Uuid, body: &str, caller: &Uuid) -> AppResult<MessageView> {
        let row = self.load_live(message_id).await?;
        if row.sender_id != *caller {
            return Err(AppError::forbidden("only the sender may edit a message"));
        }

        let sanitized = validate_body(body)?;
        let updated = db::update_message_body(&self.pool, message_id, &sanitized)
            .await?
            .ok_or_else(|| AppError::not_found("message not found"))?;
        let view = updated.into_view();

        if let Err(e) = self.cache.invalidate(&view.room_id).await {
            tracing::warn!(room_id = %view.room_id, error = %e, "hot-cache invalidation failed");
        }

        Ok(view)
    }

    /// Soft-delete a message; sender only. Returns the owning room id for
    /// fan-out of the deletion event.
    pub async fn delete(&self, message_id: &Uuid, caller: &Uuid) -> AppResult<Uuid> {
        let row = self.load_live(message_id).await?;
        if row.sender_id != *caller {
            return Err(AppError::forbidden("only the sender may delete a message"));
        }

        if !db::soft_delete_message(&self.pool, message_id).await? {
            return Err(AppError::not_found("message not found"));
        }

        if let Err(e) = self.cache.invalidate(&row.room_id).await {
            tracing::warn!(room_id = %row.room_id, error = %e, "hot-cache invalidation failed");
        }

        Ok(row.room_id)
    }

    /// Direct read; soft-deleted messages report as not found.
    pub async fn get(&self, message_id: &Uuid, caller: &Uuid) -> AppResult<MessageView> {
        let row = self.load_live(message_id).await?;
        if db::get_member(&self.pool, &row.room_id, caller).await?.is_none() {
            return Err(AppError::forbidden("not a member of this room"));
        }
        Ok(row.into_view())
    }

    async fn load_live(&self, message_id: &Uuid) -> AppResult<db::MessageRow> {
        let row = db::get_message(&self.pool, message_id)
            .await?
            .ok_or_else(|| AppError::not_found("message not found"))?;
        if row.deleted_at.is_some() {
            return Err(AppError::not_found("message not found"));
        }
        Ok(row)
    }
}

/// Validate length bounds and sanitize. The 1–2000 limit applies to the
/// body as stored, i.e. after sanitization.
fn validate_body(body: &str) -> AppResult<String> {
    if body.trim().is_empty() {
        return Err(AppError::validation("message body must not be empty"));
    }
    let sanitized = sanitize_message_body(body);
    if sanitized.is_empty() {
        return Err(AppError::validation("message body is empty after sanitization"));
    }
    if sanitized.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::validation("message body exceeds 2000 characters"));
    }
    Ok(sanitized)
}

/// Parse a millisecond cursor into a timestamp; invalid values are ignored.
pub fn cursor_from_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_bounds_are_enforced() {
        assert!(validate_body("").is_err());
        assert!(validate_body("   ").is_err());
        assert!(validate_body("hi").is_ok());
        let long = "x".repeat(2001);
        assert!(validate_body(&long).is_err());
        let exact = "x".repeat(2000);
        assert!(validate_body(&exact).is_ok());
    }

    #[test]
    fn body_that_sanitizes_to_nothing_is_rejected() {
        assert!(validate_body("javascript:").is_err());
        assert!(validate_body("onclick=").is_err());
    }

    #[test]
    fn cursor_parsing_rejects_out_of_range() {
        assert!(cursor_from_ms(1_700_000_000_000).is_some());
        assert!(cursor_from_ms(i64::MAX).is_none());
    }
}
