// Seams to external collaborators: listeners, the profile store and the cache backend

use crate::core::errors::{AuthError, CacheError};
use crate::core::models::{AuthenticationResult, StoredCredential};
use std::time::Duration;

/// Capability implemented by anything that pauses until a passphrase arrives
///
/// Returning `Err` (or panicking) is contained by the middleware and logged;
/// it never affects other registrations.
#[async_trait::async_trait]
pub trait AuthenticationListener: Send + Sync {
    async fn on_authentication_completed(&self, result: AuthenticationResult) -> anyhow::Result<()>;
}

/// Read access to persisted encrypted credentials
#[async_trait::async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn get_encrypted_credential(
        &self,
        user_id: u64,
        profile_id: u32,
    ) -> Result<Option<StoredCredential>, AuthError>;
}

/// Key/value store with per-key TTL and byte values
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value`, replacing any previous value and expiry
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Push the expiry of an existing key to `ttl` from now; missing keys are left missing
    async fn refresh(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
