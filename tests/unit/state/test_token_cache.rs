// Unit tests for the token cache

use auth_relay::core::errors::CacheError;
use auth_relay::state::memory_cache::MemoryCacheBackend;
use auth_relay::state::token_cache::{token_cache_key, TokenCache};
use crate::common::{cache_over, memory_cache, FailingCacheBackend, SlowCacheBackend};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
    lt_uid: u64,
    server: String,
}

/// Test a value read just before its TTL is still there
#[tokio::test]
async fn test_get_before_expiry() {
    let cache = memory_cache();
    cache.set("k", &"v".to_string(), Duration::from_millis(400)).await.unwrap();

    sleep(Duration::from_millis(250)).await;

    let value: Option<String> = cache.get("k").await.unwrap();
    assert_eq!(value.as_deref(), Some("v"));
}

/// Test an untouched value is gone after its TTL
#[tokio::test]
async fn test_absent_after_expiry() {
    let cache = memory_cache();
    cache.set("k", &"v".to_string(), Duration::from_millis(200)).await.unwrap();

    sleep(Duration::from_millis(400)).await;

    let value: Option<String> = cache.get("k").await.unwrap();
    assert!(value.is_none());
}

/// Test reading every T/2 keeps an entry alive well past T
#[tokio::test]
async fn test_sliding_refresh_keeps_entry_alive() {
    let cache = memory_cache();
    let ttl = Duration::from_millis(400);
    cache.set("k", &7u32, ttl).await.unwrap();

    for _ in 0..5 {
        sleep(ttl / 2).await;
        let value: Option<u32> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(7));
    }

    // No more reads: expires on its own
    sleep(ttl * 2).await;
    assert!(cache.get::<u32>("k").await.unwrap().is_none());
}

/// Test set overwrites the value and resets the TTL
#[tokio::test]
async fn test_set_overwrites() {
    let cache = memory_cache();
    cache.set("k", &"old".to_string(), Duration::from_millis(200)).await.unwrap();
    cache.set("k", &"new".to_string(), Duration::from_secs(60)).await.unwrap();

    sleep(Duration::from_millis(300)).await;

    let value: Option<String> = cache.get("k").await.unwrap();
    assert_eq!(value.as_deref(), Some("new"));
}

/// Test structured values round trip as JSON
#[tokio::test]
async fn test_structured_value() {
    let cache = memory_cache();
    let session = Session {
        lt_uid: 42,
        server: "os_asia".to_string(),
    };
    let key = token_cache_key(1, 42);

    cache.set_default(&key, &session).await.unwrap();

    let entry = cache.get_entry::<Session>(&key).await.unwrap().unwrap();
    assert_eq!(entry.value, session);
    assert_eq!(entry.key, "ltoken:1:42");
}

/// Test removing a missing key is not an error
#[tokio::test]
async fn test_remove_missing_key() {
    let cache = memory_cache();
    assert!(cache.remove("never-set").await.is_ok());
}

/// Test backend failures surface as typed errors
#[tokio::test]
async fn test_backend_failure_surfaces() {
    let cache = cache_over(Arc::new(FailingCacheBackend));

    assert!(matches!(cache.get::<String>("k").await, Err(CacheError::Backend(_))));
    assert!(matches!(cache.set_default("k", &1u8).await, Err(CacheError::Backend(_))));
    assert!(matches!(cache.ping().await, Err(CacheError::Backend(_))));
}

/// Test a stalled backend is cut off by the operation timeout
#[tokio::test]
async fn test_slow_backend_times_out() {
    let cache = TokenCache::new(
        Arc::new(SlowCacheBackend {
            delay: Duration::from_secs(5),
        }),
        Duration::from_millis(100),
        Duration::from_secs(600),
    );

    let started = Instant::now();
    let result = cache.get::<String>("k").await;

    assert_eq!(result, Err(CacheError::Timeout(Duration::from_millis(100))));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Test a value written under one type fails cleanly under another
#[tokio::test]
async fn test_wrong_type_is_serialization_error() {
    let cache = TokenCache::new(
        Arc::new(MemoryCacheBackend::new(10)),
        Duration::from_millis(200),
        Duration::from_secs(60),
    );
    cache.set_default("k", &"text".to_string()).await.unwrap();

    assert!(matches!(
        cache.get::<Session>("k").await,
        Err(CacheError::Serialization(_))
    ));
}
