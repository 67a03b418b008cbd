use crate::core::errors::CacheError;
use failsafe::futures::CircuitBreaker; // Import Async CircuitBreaker trait
use failsafe::{backoff, failure_policy, Config, Error, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding the cache backend
///
/// Policy:
/// - `threshold` consecutive failures trips the breaker OPEN
/// - `cooldown` before HALF-OPEN (one trial call)
pub type CacheCircuitBreaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::Constant>, ()>;

/// Consecutive backend failures before the breaker opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Time the breaker stays open before probing the backend again
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Create a circuit breaker with the given policy
pub fn create_circuit_breaker(threshold: u32, cooldown: Duration) -> CacheCircuitBreaker {
    Config::new()
        .failure_policy(failure_policy::consecutive_failures(threshold, backoff::constant(cooldown)))
        .build()
}

/// Run a cache operation through the breaker
///
/// While the breaker is open the operation is not started and
/// [`CacheError::CircuitOpen`] is returned immediately.
pub async fn execute_with_cb<F, Fut, T>(cb: &CacheCircuitBreaker, operation: F) -> Result<T, CacheError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, CacheError>>,
{
    match cb.call(operation()).await {
        Ok(val) => Ok(val),
        Err(Error::Inner(e)) => Err(e),
        Err(Error::Rejected) => Err(CacheError::CircuitOpen),
    }
}
