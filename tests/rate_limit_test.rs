// Redis-backed rate limiter tests.
// Run with: docker run -d -p 6379:6379 redis:7
//   cargo test --test rate_limit_test -- --ignored

use parley_server::rate_limit::{RateLimitKind, RateLimiter};
use parley_server::store::KeyedStore;
use serial_test::serial;
use std::env;
use uuid::Uuid;

async fn limiter() -> RateLimiter {
    let redis_url =
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = KeyedStore::connect(&redis_url)
        .await
        .expect("redis must be running for this test");
    RateLimiter::new(store)
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn admits_up_to_the_limit_then_denies() {
    let limiter = limiter().await;
    let id = Uuid::new_v4().to_string();
    let kind = RateLimitKind::RoomJoinUser; // 20 per 300s

    for i in 0..kind.limit() {
        let decision = limiter.check(kind, &id).await;
        assert!(decision.allowed, "admission {} should be allowed", i);
        assert_eq!(decision.remaining, kind.limit() - i - 1);
    }

    let denied = limiter.check(kind, &id).await;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(denied.retry_after > 0);
    assert!(denied.reset_time > 0);
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn separate_identifiers_do_not_interfere() {
    let limiter = limiter().await;
    let kind = RateLimitKind::RoomJoinUser;
    let first = Uuid::new_v4().to_string();
    let second = Uuid::new_v4().to_string();

    for _ in 0..kind.limit() {
        assert!(limiter.check(kind, &first).await.allowed);
    }
    assert!(!limiter.check(kind, &first).await.allowed);

    // an untouched identifier is unaffected
    assert!(limiter.check(kind, &second).await.allowed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore] // Requires Redis
#[serial]
async fn respects_limit_under_concurrent_callers() {
    let limiter = limiter().await;
    let id = Uuid::new_v4().to_string();
    let kind = RateLimitKind::MessageUser; // 60 per 60s
    let attempts = 100;

    let mut handles = Vec::new();
    for _ in 0..attempts {
        let limiter = limiter.clone();
        let id = id.clone();
        handles.push(tokio::spawn(
            async move { limiter.check(kind, &id).await },
        ));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().allowed {
            admitted += 1;
        }
    }

    assert_eq!(admitted, kind.limit(), "admitted events must equal the limit");
}
