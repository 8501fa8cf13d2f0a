// Redis-backed hot-message cache tests.
// Run with: docker run -d -p 6379:6379 redis:7
//   cargo test --test cache_test -- --ignored

use chrono::Utc;
use parley_server::cache::{MessageCache, RECENT_LIMIT};
use parley_server::db::{MessageView, ModerationMeta};
use parley_server::store::KeyedStore;
use serial_test::serial;
use std::env;
use uuid::Uuid;

async fn cache() -> MessageCache {
    let redis_url =
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = KeyedStore::connect(&redis_url)
        .await
        .expect("redis must be running for this test");
    MessageCache::new(store)
}

fn message(room_id: Uuid, body: &str) -> MessageView {
    let now = Utc::now();
    MessageView {
        id: Uuid::new_v4(),
        room_id,
        sender_id: Uuid::new_v4(),
        body: body.to_string(),
        moderation: ModerationMeta {
            sentiment: "neutral".to_string(),
            flagged: false,
            reasons: vec![],
        },
        edited_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn cold_read_misses() {
    let cache = cache().await;
    let room = Uuid::new_v4();
    assert!(cache.get_recent(&room).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn write_then_read_round_trip() {
    let cache = cache().await;
    let room = Uuid::new_v4();
    let messages = vec![message(room, "newest"), message(room, "older")];

    cache.cache_recent(&room, &messages).await.unwrap();
    let cached = cache.get_recent(&room).await.unwrap().unwrap();

    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0].body, "newest");
    assert_eq!(cached[1].body, "older");

    cache.invalidate(&room).await.unwrap();
    assert!(cache.get_recent(&room).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn prepend_keeps_newest_first_and_truncates() {
    let cache = cache().await;
    let room = Uuid::new_v4();

    let seed: Vec<MessageView> = (0..RECENT_LIMIT)
        .map(|i| message(room, &format!("m{}", i)))
        .collect();
    cache.cache_recent(&room, &seed).await.unwrap();

    let newest = message(room, "fresh");
    cache.prepend(&room, &newest).await.unwrap();

    let cached = cache.get_recent(&room).await.unwrap().unwrap();
    assert_eq!(cached.len(), RECENT_LIMIT);
    assert_eq!(cached[0].body, "fresh");
    // the oldest entry fell off the ring
    assert_eq!(cached.last().unwrap().body, format!("m{}", RECENT_LIMIT - 2));

    cache.invalidate(&room).await.unwrap();
}
