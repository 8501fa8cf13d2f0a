//! Keyed store abstraction over Redis with connection management.
//!
//! The single shared substrate for presence, rate limits, the token
//! denylist, and the hot-message cache. Connection errors propagate to the
//! caller; no transactionality is promised across operations and callers
//! tolerate intermediate states.

use redis::{aio::ConnectionManager, AsyncCommands};

pub type StoreResult<T> = Result<T, redis::RedisError>;

/// Keyed store client with automatic reconnection
#[derive(Clone)]
pub struct KeyedStore {
    conn: ConnectionManager,
}

impl KeyedStore {
    /// Connect to the store
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Raw connection access for scripted multi-step operations
    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    // ========================================================================
    // Key-Value Operations
    // ========================================================================

    pub async fn get<T: redis::FromRedisValue>(&mut self, key: &str) -> StoreResult<Option<T>> {
        self.conn.get(key).await
    }

    pub async fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.set(key, value).await
    }

    /// SETEX - set key with expiry in seconds
    pub async fn set_ex(&mut self, key: &str, value: &str, seconds: u64) -> StoreResult<()> {
        self.conn.set_ex(key, value, seconds).await
    }

    pub async fn del(&mut self, key: &str) -> StoreResult<i64> {
        self.conn.del(key).await
    }

    pub async fn exists(&mut self, key: &str) -> StoreResult<bool> {
        self.conn.exists(key).await
    }

    /// EXPIRE - set expiry time in seconds
    pub async fn expire(&mut self, key: &str, seconds: i64) -> StoreResult<bool> {
        self.conn.expire(key, seconds).await
    }

    /// TTL - remaining time to live in seconds
    pub async fn ttl(&mut self, key: &str) -> StoreResult<i64> {
        self.conn.ttl(key).await
    }

    // ========================================================================
    // Atomic Operations
    // ========================================================================

    /// INCR - increment integer value
    pub async fn incr(&mut self, key: &str) -> StoreResult<i64> {
        self.conn.incr(key, 1).await
    }

    // ========================================================================
    // Hash Operations
    // ========================================================================

    pub async fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.conn.hset(key, field, value).await
    }

    pub async fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.conn.hget(key, field).await
    }

    pub async fn hdel(&mut self, key: &str, field: &str) -> StoreResult<i64> {
        self.conn.hdel(key, field).await
    }

    pub async fn hgetall(
        &mut self,
        key: &str,
    ) -> StoreResult<std::collections::HashMap<String, String>> {
        self.conn.hgetall(key).await
    }

    // ========================================================================
    // Sorted-Set Operations (millisecond-precision scores)
    // ========================================================================

    pub async fn zadd(&mut self, key: &str, score: i64, member: &str) -> StoreResult<i64> {
        self.conn.zadd(key, member, score).await
    }

    pub async fn zrange(&mut self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.conn.zrange(key, start, stop).await
    }

    pub async fn zrange_withscores(
        &mut self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, i64)>> {
        self.conn.zrange_withscores(key, start, stop).await
    }

    pub async fn zrem(&mut self, key: &str, member: &str) -> StoreResult<i64> {
        self.conn.zrem(key, member).await
    }

    pub async fn zcard(&mut self, key: &str) -> StoreResult<i64> {
        self.conn.zcard(key).await
    }

    pub async fn zremrangebyscore(&mut self, key: &str, min: i64, max: i64) -> StoreResult<i64> {
        self.conn.zrembyscore(key, min, max).await
    }

    /// PING - connectivity probe for health checks
    pub async fn ping(&mut self) -> StoreResult<()> {
        redis::cmd("PING").query_async(&mut self.conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance:
    // docker run -d -p 6379:6379 redis:7

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_basic_operations() -> StoreResult<()> {
        let mut store = KeyedStore::connect("redis://localhost:6379").await?;

        store.set("store_test_key", "value").await?;
        let value: Option<String> = store.get("store_test_key").await?;
        assert_eq!(value, Some("value".to_string()));

        store.del("store_test_key").await?;
        let value: Option<String> = store.get("store_test_key").await?;
        assert_eq!(value, None);

        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_sorted_set_operations() -> StoreResult<()> {
        let mut store = KeyedStore::connect("redis://localhost:6379").await?;
        let key = "store_test_zset";
        store.del(key).await?;

        store.zadd(key, 100, "a").await?;
        store.zadd(key, 200, "b").await?;
        store.zadd(key, 300, "c").await?;
        assert_eq!(store.zcard(key).await?, 3);

        let removed = store.zremrangebyscore(key, 0, 150).await?;
        assert_eq!(removed, 1);
        assert_eq!(store.zrange(key, 0, -1).await?, vec!["b", "c"]);

        store.del(key).await?;
        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_hash_operations() -> StoreResult<()> {
        let mut store = KeyedStore::connect("redis://localhost:6379").await?;
        let key = "store_test_hash";
        store.del(key).await?;

        store.hset(key, "f1", "v1").await?;
        store.hset(key, "f2", "v2").await?;
        assert_eq!(store.hget(key, "f1").await?, Some("v1".to_string()));

        let all = store.hgetall(key).await?;
        assert_eq!(all.len(), 2);

        store.hdel(key, "f1").await?;
        assert_eq!(store.hget(key, "f1").await?, None);

        store.del(key).await?;
        Ok(())
    }
}
