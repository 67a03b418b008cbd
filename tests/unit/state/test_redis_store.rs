// Redis backend tests; skipped when no local Redis answers

use auth_relay::core::traits::CacheBackend;
use auth_relay::state::redis_store::RedisCacheBackend;
use auth_relay::state::token_cache::TokenCache;
use auth_relay::CorrelationId;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const REDIS_URL: &str = "redis://127.0.0.1:6379/15";

async fn connect() -> Option<RedisCacheBackend> {
    match RedisCacheBackend::connect(REDIS_URL, Duration::from_secs(1), Duration::from_millis(500)).await {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("Skipping Redis test: {}", e);
            None
        }
    }
}

fn unique_key(prefix: &str) -> String {
    format!("auth-relay-test:{}:{}", prefix, CorrelationId::generate().short())
}

/// Test set/get/remove against a real Redis
#[tokio::test]
async fn test_redis_round_trip() {
    let Some(backend) = connect().await else { return };
    let key = unique_key("round-trip");

    backend.set(&key, b"abc123".to_vec(), Duration::from_secs(10)).await.unwrap();
    assert_eq!(backend.get(&key).await.unwrap(), Some(b"abc123".to_vec()));

    backend.remove(&key).await.unwrap();
    assert_eq!(backend.get(&key).await.unwrap(), None);
}

/// Test PX expiry and PEXPIRE refresh
#[tokio::test]
async fn test_redis_ttl_and_refresh() {
    let Some(backend) = connect().await else { return };
    let key = unique_key("ttl");

    backend.set(&key, b"v".to_vec(), Duration::from_millis(300)).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    backend.refresh(&key, Duration::from_millis(300)).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(backend.get(&key).await.unwrap().is_some());

    sleep(Duration::from_millis(300)).await;
    assert!(backend.get(&key).await.unwrap().is_none());
}

/// Test the typed cache over Redis
#[tokio::test]
async fn test_token_cache_over_redis() {
    let Some(backend) = connect().await else { return };
    let cache = TokenCache::new(Arc::new(backend), Duration::from_millis(500), Duration::from_secs(10));
    let key = unique_key("typed");

    cache.set_default(&key, &"abc123".to_string()).await.unwrap();
    let value: Option<String> = cache.get(&key).await.unwrap();
    assert_eq!(value.as_deref(), Some("abc123"));
    cache.remove(&key).await.unwrap();
}

/// Test connecting to a closed port fails instead of hanging
#[tokio::test]
async fn test_connect_refused() {
    let result = RedisCacheBackend::connect(
        "redis://127.0.0.1:1/0",
        Duration::from_millis(500),
        Duration::from_millis(200),
    )
    .await;
    assert!(result.is_err());
}
