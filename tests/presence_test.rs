// Redis-backed presence registry tests.
// Run with: docker run -d -p 6379:6379 redis:7
//   cargo test --test presence_test -- --ignored

use parley_server::presence::{PresenceRegistry, PresenceStatus};
use parley_server::store::KeyedStore;
use serial_test::serial;
use std::env;
use uuid::Uuid;

async fn registry() -> PresenceRegistry {
    let redis_url =
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = KeyedStore::connect(&redis_url)
        .await
        .expect("redis must be running for this test");
    PresenceRegistry::new(store)
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn online_offline_round_trip() {
    let registry = registry().await;
    let user = Uuid::new_v4().to_string();

    registry.set_online(&user, "socket-1").await.unwrap();
    let record = registry.get(&user).await.unwrap().unwrap();
    assert_eq!(record.status, PresenceStatus::Online);
    assert_eq!(record.socket_id, "socket-1");
    assert!(record.last_seen > 0);

    registry.set_offline(&user).await.unwrap();
    let record = registry.get(&user).await.unwrap().unwrap();
    assert_eq!(record.status, PresenceStatus::Offline);
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn heartbeat_advances_last_seen() {
    let registry = registry().await;
    let user = Uuid::new_v4().to_string();

    registry.set_online(&user, "socket-1").await.unwrap();
    let before = registry.get(&user).await.unwrap().unwrap().last_seen;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    registry.heartbeat(&user).await.unwrap();

    let after = registry.get(&user).await.unwrap().unwrap().last_seen;
    assert!(after > before);
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn room_membership_triangle() {
    let registry = registry().await;
    let user = Uuid::new_v4().to_string();
    let room_a = Uuid::new_v4().to_string();
    let room_b = Uuid::new_v4().to_string();

    registry.set_online(&user, "socket-1").await.unwrap();
    registry.add_to_room(&user, &room_a).await.unwrap();
    registry.add_to_room(&user, &room_b).await.unwrap();

    let mut rooms = registry.user_rooms(&user).await.unwrap();
    rooms.sort();
    let mut expected = vec![room_a.clone(), room_b.clone()];
    expected.sort();
    assert_eq!(rooms, expected);

    assert_eq!(registry.room_users(&room_a).await.unwrap(), vec![user.clone()]);

    registry.remove_from_room(&user, &room_a).await.unwrap();
    assert!(registry.room_users(&room_a).await.unwrap().is_empty());
    assert_eq!(registry.user_rooms(&user).await.unwrap(), vec![room_b.clone()]);

    registry.remove_from_room(&user, &room_b).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn cleanup_clears_rooms_and_marks_offline() {
    let registry = registry().await;
    let user = Uuid::new_v4().to_string();
    let room = Uuid::new_v4().to_string();

    registry.set_online(&user, "socket-1").await.unwrap();
    registry.add_to_room(&user, &room).await.unwrap();

    registry.cleanup_user(&user).await.unwrap();

    assert!(registry.user_rooms(&user).await.unwrap().is_empty());
    assert!(registry.room_users(&room).await.unwrap().is_empty());
    let record = registry.get(&user).await.unwrap().unwrap();
    assert_eq!(record.status, PresenceStatus::Offline);
}
