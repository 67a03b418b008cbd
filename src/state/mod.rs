// Token cache and its storage backends

pub mod memory_cache;
pub mod redis_store;
pub mod token_cache;

use crate::config::{CacheBackendKind, Config};
use crate::core::errors::CacheError;
use crate::core::traits::CacheBackend;
use std::sync::Arc;

/// Build the backend selected by `CACHE_BACKEND`
pub async fn connect_backend(config: &Config) -> Result<Arc<dyn CacheBackend>, CacheError> {
    match config.cache_backend {
        CacheBackendKind::Redis => {
            let backend = redis_store::RedisCacheBackend::connect(
                &config.redis_url,
                config.redis_connection_timeout(),
                config.redis_operation_timeout(),
            )
            .await?;
            tracing::info!(redis_url = %redact_url(&config.redis_url), "Connected to Redis token cache");
            Ok(Arc::new(backend))
        }
        CacheBackendKind::Memory => {
            tracing::info!(capacity = config.memory_cache_max_capacity, "Using in-memory token cache");
            Ok(Arc::new(memory_cache::MemoryCacheBackend::new(config.memory_cache_max_capacity)))
        }
    }
}

/// Build a [`token_cache::TokenCache`] over the configured backend
pub async fn build_token_cache(config: &Config) -> Result<token_cache::TokenCache, CacheError> {
    let backend = connect_backend(config).await?;
    Ok(token_cache::TokenCache::new(
        backend,
        config.redis_operation_timeout(),
        config.token_cache_ttl(),
    ))
}

/// Strip credentials from a Redis URL before logging it
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
