//! Per-room bounded ring of the most-recent message projections.
//!
//! The cache is advisory: cold reads fall through to the database, writes
//! are best-effort, and staleness is bounded by the TTL. Invalidation on
//! edit/delete happens by re-caching on the next write.

use uuid::Uuid;

use crate::db::MessageView;
use crate::error::AppResult;
use crate::store::KeyedStore;

/// Maximum projections retained per room
pub const RECENT_LIMIT: usize = 50;
const TTL_SECS: u64 = 300;

fn room_key(room_id: &Uuid) -> String {
    format!("recent:room:{}", room_id)
}

#[derive(Clone)]
pub struct MessageCache {
    store: KeyedStore,
}

impl MessageCache {
    pub fn new(store: KeyedStore) -> Self {
        Self { store }
    }

    /// Replace the cached ring with `messages` (newest first), truncated to
    /// the ring size.
    pub async fn cache_recent(&self, room_id: &Uuid, messages: &[MessageView]) -> AppResult<()> {
        let bounded = &messages[..messages.len().min(RECENT_LIMIT)];
        let json = serde_json::to_string(bounded)
            .map_err(|e| crate::error::AppError::internal(format!("cache encode failed: {}", e)))?;
        let mut store = self.store.clone();
        store.set_ex(&room_key(room_id), &json, TTL_SECS).await?;
        Ok(())
    }

    pub async fn get_recent(&self, room_id: &Uuid) -> AppResult<Option<Vec<MessageView>>> {
        let mut store = self.store.clone();
        let raw: Option<String> = store.get(&room_key(room_id)).await?;
        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(messages) => Ok(Some(messages)),
                Err(e) => {
                    // A corrupt entry is just a cache miss
                    tracing::warn!(room_id = %room_id, error = %e, "dropping corrupt cache entry");
                    store.del(&room_key(room_id)).await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Prepend a new message onto the ring and re-truncate. A cold cache
    /// starts a fresh ring with just this message.
    pub async fn prepend(&self, room_id: &Uuid, message: &MessageView) -> AppResult<()> {
        let mut messages = self.get_recent(room_id).await?.unwrap_or_default();
        messages.insert(0, message.clone());
        messages.truncate(RECENT_LIMIT);
        self.cache_recent(room_id, &messages).await
    }

    pub async fn invalidate(&self, room_id: &Uuid) -> AppResult<()> {
        let mut store = self.store.clone();
        store.del(&room_key(room_id)).await?;
        Ok(())
    }
}
