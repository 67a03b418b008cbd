// Redis cache backend over a ConnectionManager, guarded by a circuit breaker

use crate::core::errors::CacheError;
use crate::core::resilience::{
    create_circuit_breaker, execute_with_cb, CacheCircuitBreaker, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD,
};
use crate::core::traits::CacheBackend;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

/// Redis-backed cache store
///
/// Values are written with `SET key value PX ttl`, refreshed with `PEXPIRE`.
/// Every command is bounded by the operation timeout and counted by the
/// circuit breaker, so a dead Redis fails fast instead of stalling commands.
pub struct RedisCacheBackend {
    connection_manager: ConnectionManager,
    operation_timeout: Duration,
    breaker: CacheCircuitBreaker,
}

impl RedisCacheBackend {
    /// Connect to Redis, retrying with linear backoff
    ///
    /// The connection is verified with `PING` before it is handed out.
    pub async fn connect(
        redis_url: &str,
        connection_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<Self, CacheError> {
        const MAX_RETRIES: u32 = 3;
        const INITIAL_DELAY_MS: u64 = 250;

        let mut connection_errors = Vec::new();

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                sleep(Duration::from_millis(INITIAL_DELAY_MS * attempt as u64)).await;
            }

            match Self::try_create_connection(redis_url, connection_timeout, operation_timeout).await {
                Ok(store) => match store.ping().await {
                    Ok(()) => {
                        if attempt > 0 {
                            tracing::info!("Redis connection succeeded on attempt {}", attempt + 1);
                        }
                        return Ok(store);
                    }
                    Err(e) => {
                        connection_errors.push(format!("Connection created but ping failed: {}", e));
                    }
                },
                Err(e) => {
                    if attempt < MAX_RETRIES - 1 {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            error = %e,
                            "Redis connection attempt failed, retrying..."
                        );
                    }
                    connection_errors.push(format!("Attempt {} failed: {}", attempt + 1, e));
                }
            }
        }

        Err(CacheError::Backend(format!(
            "Failed to create Redis connection after {} attempts: {}",
            MAX_RETRIES,
            connection_errors.join("; ")
        )))
    }

    async fn try_create_connection(
        redis_url: &str,
        connection_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("Invalid Redis URL: {}", e)))?;

        let connection_manager = timeout(connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(connection_timeout))?
            .map_err(|e| CacheError::Backend(format!("Failed to create Redis ConnectionManager: {}", e)))?;

        Ok(Self {
            connection_manager,
            operation_timeout,
            breaker: create_circuit_breaker(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN),
        })
    }

    /// Run one command with the operation timeout, through the breaker
    async fn run<T, F, Fut>(&self, command: &'static str, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection_manager.clone();
        let limit = self.operation_timeout;

        execute_with_cb(&self.breaker, || async move {
            match timeout(limit, op(conn)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(CacheError::Backend(format!("{} failed: {}", command, e))),
                Err(_) => Err(CacheError::Timeout(limit)),
            }
        })
        .await
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.run("GET", |mut conn| async move {
            redis::cmd("GET").arg(key).query_async(&mut conn).await
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let millis = ttl_millis(ttl);
        self.run("SET", |mut conn| async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(millis)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let millis = ttl_millis(ttl);
        let _updated: i64 = self
            .run("PEXPIRE", |mut conn| async move {
                redis::cmd("PEXPIRE").arg(key).arg(millis).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let _removed: i64 = self
            .run("DEL", |mut conn| async move {
                redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let result: String = self
            .run("PING", |mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;

        if result == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Backend(format!("Redis ping returned unexpected response: {}", result)))
        }
    }
}
