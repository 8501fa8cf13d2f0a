//! One broadcast channel per room. Fan-out goes through the channel, never
//! by iterating sockets; every socket in a room holds a subscription.

use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::events::ServerEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Channel name, used for logging only; the map is keyed by room id.
pub fn channel_name(room_id: &Uuid) -> String {
    format!("room:{}", room_id)
}

#[derive(Default)]
pub struct RoomChannels {
    inner: RwLock<HashMap<Uuid, broadcast::Sender<ServerEvent>>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a room's channel, creating it on first use.
    pub async fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        if let Some(sender) = self.inner.read().await.get(&room_id) {
            return sender.subscribe();
        }
        let mut channels = self.inner.write().await;
        channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Broadcast to every subscriber of a room. A room with no channel or
    /// no subscribers is a no-op.
    pub async fn publish(&self, room_id: Uuid, event: ServerEvent) {
        let sender = self.inner.read().await.get(&room_id).cloned();
        if let Some(sender) = sender {
            if sender.send(event).is_err() {
                tracing::trace!(channel = %channel_name(&room_id), "no subscribers");
            }
        }
    }

    /// Drop channels nobody listens to anymore.
    pub async fn prune(&self, room_id: &Uuid) {
        let mut channels = self.inner.write().await;
        if let Some(sender) = channels.get(room_id) {
            if sender.receiver_count() == 0 {
                channels.remove(room_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let channels = RoomChannels::new();
        let room = Uuid::new_v4();

        let mut rx1 = channels.subscribe(room).await;
        let mut rx2 = channels.subscribe(room).await;

        channels.publish(room, ServerEvent::Ping).await;

        assert!(matches!(rx1.recv().await.unwrap(), ServerEvent::Ping));
        assert!(matches!(rx2.recv().await.unwrap(), ServerEvent::Ping));
    }

    #[tokio::test]
    async fn publish_to_unknown_room_is_a_noop() {
        let channels = RoomChannels::new();
        channels.publish(Uuid::new_v4(), ServerEvent::Ping).await;
    }

    #[tokio::test]
    async fn prune_removes_abandoned_channels() {
        let channels = RoomChannels::new();
        let room = Uuid::new_v4();

        let rx = channels.subscribe(room).await;
        drop(rx);
        channels.prune(&room).await;

        assert!(channels.inner.read().await.get(&room).is_none());
    }
}
