// Moka cache backend with per-entry TTL

use crate::core::errors::CacheError;
use crate::core::traits::CacheBackend;
use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::Op;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct MemoryEntry {
    bytes: Arc<Vec<u8>>,
    ttl: Duration,
}

/// Every write (insert or overwrite) restarts the entry's own TTL
struct PerEntryTtl;

impl Expiry<String, MemoryEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &MemoryEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backend
///
/// Used for single-instance deployments and tests. Entries are lost on restart,
/// which only forces users back through the passphrase prompt.
pub struct MemoryCacheBackend {
    cache: Cache<String, MemoryEntry>,
}

impl MemoryCacheBackend {
    /// Create a backend holding at most `max_capacity` entries
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }

    /// Number of live entries (approximate until pending maintenance runs)
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.bytes.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            bytes: Arc::new(value),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        // Read and re-insert under the entry lock so a concurrent remove or set wins
        self.cache
            .entry_by_ref(key)
            .and_compute_with(|current| async move {
                match current {
                    Some(entry) => Op::Put(MemoryEntry {
                        bytes: Arc::clone(&entry.value().bytes),
                        ttl,
                    }),
                    None => Op::Nop,
                }
            })
            .await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
