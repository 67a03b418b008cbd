// Typed TTL cache over a pluggable backend

use crate::core::errors::CacheError;
use crate::core::models::CacheEntry;
use crate::core::traits::CacheBackend;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key under which a user's decrypted token for one game account is cached
pub fn token_cache_key(user_id: u64, lt_uid: u64) -> String {
    format!("ltoken:{}:{}", user_id, lt_uid)
}

/// What actually lands in the backend. The TTL travels with the value so a
/// read can slide the expiry by the entry's own lifetime.
#[derive(Serialize, Deserialize)]
struct StoredValue<T> {
    value: T,
    ttl_ms: u64,
}

/// TTL key-value cache shared by all command handlers
///
/// - Values are serialized as JSON.
/// - A successful `get` re-arms the entry's TTL (sliding expiration).
/// - Every backend call is bounded by `operation_timeout`.
#[derive(Clone)]
pub struct TokenCache {
    backend: Arc<dyn CacheBackend>,
    operation_timeout: Duration,
    default_ttl: Duration,
}

impl TokenCache {
    pub fn new(backend: Arc<dyn CacheBackend>, operation_timeout: Duration, default_ttl: Duration) -> Self {
        Self {
            backend,
            operation_timeout,
            default_ttl,
        }
    }

    /// TTL applied when callers do not choose one
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` under `key`, replacing any existing entry
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let stored = StoredValue {
            value,
            ttl_ms: ttl.as_millis() as u64,
        };
        let bytes = serde_json::to_vec(&stored).map_err(|e| CacheError::Serialization(e.to_string()))?;

        self.bounded("set", self.backend.set(key, bytes, ttl)).await?;
        debug!(key, ttl_secs = ttl.as_secs(), "Cache entry stored");
        Ok(())
    }

    /// Store with the configured default TTL
    pub async fn set_default<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        self.set(key, value, self.default_ttl).await
    }

    /// Fetch a value; `Ok(None)` on miss or expiry
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Fetch a value together with its refreshed expiry
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
        let bytes = match self.bounded("get", self.backend.get(key)).await? {
            Some(bytes) => bytes,
            None => {
                debug!(key, "Cache miss");
                return Ok(None);
            }
        };

        let stored: StoredValue<T> =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let ttl = Duration::from_millis(stored.ttl_ms);

        // The value is still valid if the slide fails; it just expires on schedule
        if let Err(e) = self.bounded("refresh", self.backend.refresh(key, ttl)).await {
            warn!(key, error = %e, "Failed to refresh cache entry TTL");
        }

        debug!(key, "Cache hit");
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Ok(Some(CacheEntry {
            key: key.to_string(),
            value: stored.value,
            expires_at,
        }))
    }

    /// Delete an entry. Removing a missing key succeeds.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.bounded("remove", self.backend.remove(key)).await?;
        debug!(key, "Cache entry removed");
        Ok(())
    }

    /// Check that the backend is reachable
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded("ping", self.backend.ping()).await
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Cache operation timed out"
                );
                Err(CacheError::Timeout(self.operation_timeout))
            }
        }
    }
}
