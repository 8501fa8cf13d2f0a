//! Presence registry: the user / socket / room triangle over store hashes.
//!
//! Keys: `user:presence` (userId -> JSON blob), `room:users`
//! (`roomId:userId` -> "1"), `user:rooms` (`userId:roomId` -> "1").
//! Heartbeats refresh the blob every 20 s; a blob not refreshed for more
//! than 30 s reads as offline.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::PRESENCE_STALE_SECS;
use crate::error::AppResult;
use crate::store::KeyedStore;

const USER_PRESENCE_KEY: &str = "user:presence";
const ROOM_USERS_KEY: &str = "room:users";
const USER_ROOMS_KEY: &str = "user:rooms";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    pub socket_id: String,
    /// Millisecond timestamp of the last heartbeat
    pub last_seen: i64,
    /// Millisecond timestamp the socket connected
    pub connected_at: i64,
}

#[derive(Clone)]
pub struct PresenceRegistry {
    store: KeyedStore,
}

impl PresenceRegistry {
    pub fn new(store: KeyedStore) -> Self {
        Self { store }
    }

    pub async fn set_online(&self, user_id: &str, socket_id: &str) -> AppResult<()> {
        let now = Utc::now().timestamp_millis();
        let record = PresenceRecord {
            status: PresenceStatus::Online,
            socket_id: socket_id.to_string(),
            last_seen: now,
            connected_at: now,
        };
        self.write_record(user_id, &record).await
    }

    pub async fn set_offline(&self, user_id: &str) -> AppResult<()> {
        let now = Utc::now().timestamp_millis();
        let record = match self.read_record(user_id).await? {
            Some(mut existing) => {
                existing.status = PresenceStatus::Offline;
                existing.last_seen = now;
                existing
            }
            None => PresenceRecord {
                status: PresenceStatus::Offline,
                socket_id: String::new(),
                last_seen: now,
                connected_at: now,
            },
        };
        self.write_record(user_id, &record).await
    }

    /// Refresh the heartbeat timestamp, keeping the rest of the blob.
    pub async fn heartbeat(&self, user_id: &str) -> AppResult<()> {
        if let Some(mut record) = self.read_record(user_id).await? {
            record.last_seen = Utc::now().timestamp_millis();
            self.write_record(user_id, &record).await?;
        }
        Ok(())
    }

    /// Read a presence record; a stale heartbeat reads as offline.
    pub async fn get(&self, user_id: &str) -> AppResult<Option<PresenceRecord>> {
        let record = self.read_record(user_id).await?;
        Ok(record.map(|mut r| {
            let stale_before = Utc::now().timestamp_millis() - PRESENCE_STALE_SECS * 1000;
            if r.status == PresenceStatus::Online && r.last_seen < stale_before {
                r.status = PresenceStatus::Offline;
            }
            r
        }))
    }

    pub async fn add_to_room(&self, user_id: &str, room_id: &str) -> AppResult<()> {
        let mut store = self.store.clone();
        store
            .hset(ROOM_USERS_KEY, &format!("{}:{}", room_id, user_id), "1")
            .await?;
        store
            .hset(USER_ROOMS_KEY, &format!("{}:{}", user_id, room_id), "1")
            .await?;
        Ok(())
    }

    pub async fn remove_from_room(&self, user_id: &str, room_id: &str) -> AppResult<()> {
        let mut store = self.store.clone();
        store
            .hdel(ROOM_USERS_KEY, &format!("{}:{}", room_id, user_id))
            .await?;
        store
            .hdel(USER_ROOMS_KEY, &format!("{}:{}", user_id, room_id))
            .await?;
        Ok(())
    }

    /// User ids currently present in a room.
    pub async fn room_users(&self, room_id: &str) -> AppResult<Vec<String>> {
        let mut store = self.store.clone();
        let fields = store.hgetall(ROOM_USERS_KEY).await?;
        let prefix = format!("{}:", room_id);
        Ok(fields
            .into_keys()
            .filter_map(|field| field.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Room ids a user is currently present in.
    pub async fn user_rooms(&self, user_id: &str) -> AppResult<Vec<String>> {
        let mut store = self.store.clone();
        let fields = store.hgetall(USER_ROOMS_KEY).await?;
        let prefix = format!("{}:", user_id);
        Ok(fields
            .into_keys()
            .filter_map(|field| field.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Remove the user from every room and mark them offline.
    pub async fn cleanup_user(&self, user_id: &str) -> AppResult<()> {
        for room_id in self.user_rooms(user_id).await? {
            self.remove_from_room(user_id, &room_id).await?;
        }
        self.set_offline(user_id).await
    }

    async fn read_record(&self, user_id: &str) -> AppResult<Option<PresenceRecord>> {
        let mut store = self.store.clone();
        let raw = store.hget(USER_PRESENCE_KEY, user_id).await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json).ok()),
            None => Ok(None),
        }
    }

    async fn write_record(&self, user_id: &str, record: &PresenceRecord) -> AppResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| crate::error::AppError::internal(format!("presence encode: {}", e)))?;
        let mut store = self.store.clone();
        store.hset(USER_PRESENCE_KEY, user_id, &json).await?;
        Ok(())
    }
}
