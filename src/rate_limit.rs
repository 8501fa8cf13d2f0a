//! Sliding-window rate limiting over store sorted sets.
//!
//! Each admission keeps a timestamped member in `rate:<kind>:<id>`; entries
//! older than the window are evicted before counting. Store failures fail
//! open with a logged warning so the limiter never takes the service down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::{KeyedStore, StoreResult};

/// Recognized rate-limit identifiers with their canonical configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    /// Messages per user
    MessageUser,
    /// Messages per client IP
    MessageIp,
    /// WebSocket handshakes per client IP
    WebsocketIp,
    /// REST requests per user
    ApiUser,
    /// Room joins per user
    RoomJoinUser,
}

impl RateLimitKind {
    pub fn limit(&self) -> i64 {
        match self {
            RateLimitKind::MessageUser => 60,
            RateLimitKind::MessageIp => 100,
            RateLimitKind::WebsocketIp => 10,
            RateLimitKind::ApiUser => 1000,
            RateLimitKind::RoomJoinUser => 20,
        }
    }

    pub fn window_secs(&self) -> i64 {
        match self {
            RateLimitKind::MessageUser => 60,
            RateLimitKind::MessageIp => 60,
            RateLimitKind::WebsocketIp => 300,
            RateLimitKind::ApiUser => 3600,
            RateLimitKind::RoomJoinUser => 300,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitKind::MessageUser => "messageUser",
            RateLimitKind::MessageIp => "messageIP",
            RateLimitKind::WebsocketIp => "websocketIP",
            RateLimitKind::ApiUser => "apiUser",
            RateLimitKind::RoomJoinUser => "roomJoinUser",
        }
    }
}

/// Outcome of an admission request.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    /// Millisecond timestamp at which the window frees up
    pub reset_time: i64,
    /// Whole seconds the caller should wait before retrying (0 when allowed)
    pub retry_after: i64,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: KeyedStore,
    /// Disambiguates members admitted within the same millisecond
    seq: Arc<AtomicU64>,
}

impl RateLimiter {
    pub fn new(store: KeyedStore) -> Self {
        Self {
            store,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Admit or deny one event for `(kind, id)`.
    ///
    /// Fails open: a store error logs a warning and admits the event.
    pub async fn check(&self, kind: RateLimitKind, id: &str) -> RateLimitDecision {
        match self.try_check(kind, id).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = kind.as_str(),
                    id = %id,
                    "rate limiter store error, failing open"
                );
                let now_ms = chrono::Utc::now().timestamp_millis();
                RateLimitDecision {
                    allowed: true,
                    remaining: kind.limit() - 1,
                    reset_time: now_ms + kind.window_secs() * 1000,
                    retry_after: 0,
                }
            }
        }
    }

    /// Evict, count, and admit in one scripted round trip so concurrent
    /// callers for the same identifier cannot over-admit between the count
    /// and the insert.
    async fn try_check(&self, kind: RateLimitKind, id: &str) -> StoreResult<RateLimitDecision> {
        let mut store = self.store.clone();
        let key = format!("rate:{}:{}", kind.as_str(), id);
        let limit = kind.limit();
        let window_ms = kind.window_secs() * 1000;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let member = format!("{}-{}", now_ms, self.seq.fetch_add(1, Ordering::Relaxed));

        let script = redis::Script::new(
            r"
            redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, ARGV[1])
            local card = redis.call('ZCARD', KEYS[1])
            if card >= tonumber(ARGV[2]) then
                local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
                return {0, oldest[2]}
            end
            redis.call('ZADD', KEYS[1], ARGV[3], ARGV[4])
            redis.call('EXPIRE', KEYS[1], ARGV[5])
            return {1, tostring(card)}
            ",
        );

        let (admitted, value): (i64, String) = script
            .key(&key)
            .arg(now_ms - window_ms)
            .arg(limit)
            .arg(now_ms)
            .arg(&member)
            .arg(kind.window_secs())
            .invoke_async(store.connection_mut())
            .await?;

        if admitted == 0 {
            let oldest_score: i64 = value.parse().unwrap_or(now_ms);
            let reset_time = oldest_score + window_ms;
            let retry_after = ((reset_time - now_ms).max(0) + 999) / 1000;
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_time,
                retry_after,
            });
        }

        let cardinality: i64 = value.parse().unwrap_or(0);
        Ok(RateLimitDecision {
            allowed: true,
            remaining: limit - cardinality - 1,
            reset_time: now_ms + window_ms,
            retry_after: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_configurations() {
        assert_eq!(RateLimitKind::MessageUser.limit(), 60);
        assert_eq!(RateLimitKind::MessageUser.window_secs(), 60);
        assert_eq!(RateLimitKind::MessageIp.limit(), 100);
        assert_eq!(RateLimitKind::WebsocketIp.window_secs(), 300);
        assert_eq!(RateLimitKind::ApiUser.limit(), 1000);
        assert_eq!(RateLimitKind::ApiUser.window_secs(), 3600);
        assert_eq!(RateLimitKind::RoomJoinUser.limit(), 20);
    }

    #[test]
    fn kind_key_fragments_are_stable() {
        // key layout is rate:<kind>:<id>; renaming a fragment would orphan
        // live buckets in the store
        assert_eq!(RateLimitKind::MessageUser.as_str(), "messageUser");
        assert_eq!(RateLimitKind::MessageIp.as_str(), "messageIP");
        assert_eq!(RateLimitKind::WebsocketIp.as_str(), "websocketIP");
        assert_eq!(RateLimitKind::ApiUser.as_str(), "apiUser");
        assert_eq!(RateLimitKind::RoomJoinUser.as_str(), "roomJoinUser");
    }
}
