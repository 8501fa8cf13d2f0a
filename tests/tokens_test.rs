// Redis-backed token denylist tests.
// Run with: docker run -d -p 6379:6379 redis:7
//   cargo test --test tokens_test -- --ignored

use chrono::Utc;
use parley_server::auth::AuthManager;
use parley_server::config::{AnalyzerConfig, Config, DbConfig, KafkaConfig};
use parley_server::store::KeyedStore;
use parley_server::tokens::TokenDenylist;
use serial_test::serial;
use std::env;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        port: 4000,
        database_url: String::new(),
        redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        kafka: KafkaConfig {
            brokers: String::new(),
            consumer_group: String::new(),
        },
        analyzer: AnalyzerConfig {
            base_url: String::new(),
            shared_secret: String::new(),
            timeout_secs: 5,
        },
        jwt_access_secret: "test-access-secret-0123456789-0123456789".to_string(),
        jwt_refresh_secret: "test-refresh-secret-0123456789-012345678".to_string(),
        jwt_access_ttl_secs: 900,
        jwt_refresh_ttl_secs: 604_800,
        cors_origins: vec![],
        rust_log: "info".to_string(),
        db: DbConfig {
            max_connections: 1,
            acquire_timeout_secs: 5,
        },
    }
}

async fn denylist() -> (TokenDenylist, AuthManager) {
    let config = test_config();
    let store = KeyedStore::connect(&config.redis_url)
        .await
        .expect("redis must be running for this test");
    (TokenDenylist::new(store), AuthManager::new(&config))
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn blacklisted_token_stays_blacklisted() {
    let (denylist, auth) = denylist().await;
    let user_id = Uuid::new_v4();
    let (token, _) = auth.issue_refresh(&user_id, "a@x.io", "user").unwrap();

    assert!(!denylist.is_blacklisted(&token).await.unwrap());

    denylist.blacklist_token(&token).await.unwrap();
    assert!(denylist.is_blacklisted(&token).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn undecodable_token_needs_no_marker() {
    let (denylist, _) = denylist().await;

    denylist.blacklist_token("garbage").await.unwrap();
    assert!(!denylist.is_blacklisted("garbage").await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis
#[serial]
async fn user_cutoff_rejects_tokens_issued_before_it() {
    let (denylist, _) = denylist().await;
    let user_id = Uuid::new_v4().to_string();
    let before_cutoff_ms = Utc::now().timestamp_millis() - 1000;

    assert!(!denylist
        .is_user_blacklisted_at(&user_id, before_cutoff_ms)
        .await
        .unwrap());

    denylist.blacklist_user(&user_id).await.unwrap();

    assert!(denylist
        .is_user_blacklisted_at(&user_id, before_cutoff_ms)
        .await
        .unwrap());

    // a token issued after the cutoff passes
    let after_cutoff_ms = Utc::now().timestamp_millis() + 1000;
    assert!(!denylist
        .is_user_blacklisted_at(&user_id, after_cutoff_ms)
        .await
        .unwrap());
}
