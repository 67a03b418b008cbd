// Common test utilities and helpers for all test modules
#![allow(dead_code)]

use auth_relay::auth::{AuthenticationMiddleware, Authenticator, InMemoryCredentialRepository};
use auth_relay::core::crypto::EncryptionService;
use auth_relay::core::errors::{AuthError, CacheError};
use auth_relay::core::models::{AuthenticationResult, PassphraseSubmission, StoredCredential};
use auth_relay::core::traits::{AuthenticationListener, CacheBackend, CredentialRepository};
use auth_relay::state::memory_cache::MemoryCacheBackend;
use auth_relay::state::token_cache::TokenCache;
use auth_relay::CorrelationId;
use secrecy::Secret;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const USER_ID: u64 = 1;
pub const PROFILE_ID: u32 = 1;
pub const LT_UID: u64 = 42;
pub const LTOKEN: &str = "abc123";
pub const PASSPHRASE: &str = "hunter2";

/// Key derivation cheap enough for tests
pub fn fast_encryption() -> EncryptionService {
    EncryptionService::with_iterations(NonZeroU32::new(1_000).unwrap())
}

pub fn memory_cache() -> TokenCache {
    cache_over(Arc::new(MemoryCacheBackend::new(1_000)))
}

pub fn cache_over(backend: Arc<dyn CacheBackend>) -> TokenCache {
    TokenCache::new(backend, Duration::from_millis(200), Duration::from_secs(600))
}

/// Listener that records every result it receives
#[derive(Default)]
pub struct RecordingListener {
    results: Mutex<Vec<AuthenticationResult>>,
    notify: Notify,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn take(&self) -> Vec<AuthenticationResult> {
        std::mem::take(&mut *self.results.lock().unwrap())
    }

    /// Wait until at least one result arrived, up to `timeout`
    pub async fn wait_for_call(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.calls() > 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.calls() > 0;
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthenticationListener for RecordingListener {
    async fn on_authentication_completed(&self, result: AuthenticationResult) -> anyhow::Result<()> {
        self.results.lock().unwrap().push(result);
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Listener that always returns an error
#[derive(Default)]
pub struct FailingListener {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl AuthenticationListener for FailingListener {
    async fn on_authentication_completed(&self, _result: AuthenticationResult) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("listener could not send the follow-up message")
    }
}

/// Listener that panics when invoked
pub struct PanickingListener;

#[async_trait::async_trait]
impl AuthenticationListener for PanickingListener {
    async fn on_authentication_completed(&self, _result: AuthenticationResult) -> anyhow::Result<()> {
        panic!("listener blew up")
    }
}

/// Listener that never returns
#[derive(Default)]
pub struct HangingListener {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl AuthenticationListener for HangingListener {
    async fn on_authentication_completed(&self, _result: AuthenticationResult) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Cache backend that fails every operation
pub struct FailingCacheBackend;

#[async_trait::async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn refresh(&self, _key: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }
}

/// Cache backend that stalls every operation longer than any sane timeout
pub struct SlowCacheBackend {
    pub delay: Duration,
}

#[async_trait::async_trait]
impl CacheBackend for SlowCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn refresh(&self, _key: &str, _ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Memory backend that counts writes
pub struct CountingCacheBackend {
    inner: MemoryCacheBackend,
    pub sets: AtomicUsize,
}

impl Default for CountingCacheBackend {
    fn default() -> Self {
        Self {
            inner: MemoryCacheBackend::new(1_000),
            sets: AtomicUsize::new(0),
        }
    }
}

impl CountingCacheBackend {
    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CacheBackend for CountingCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner.refresh(key, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.inner.ping().await
    }
}

/// Repository that answers after a delay
pub struct SlowRepository {
    pub inner: InMemoryCredentialRepository,
    pub delay: Duration,
}

#[async_trait::async_trait]
impl CredentialRepository for SlowRepository {
    async fn get_encrypted_credential(
        &self,
        user_id: u64,
        profile_id: u32,
    ) -> Result<Option<StoredCredential>, AuthError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_encrypted_credential(user_id, profile_id).await
    }
}

/// Repository whose database is down
pub struct FailingRepository;

#[async_trait::async_trait]
impl CredentialRepository for FailingRepository {
    async fn get_encrypted_credential(
        &self,
        _user_id: u64,
        _profile_id: u32,
    ) -> Result<Option<StoredCredential>, AuthError> {
        Err(AuthError::Repository("database unavailable".to_string()))
    }
}

/// Repository holding the standard test profile (`abc123` sealed with `hunter2`)
pub fn seeded_repository() -> InMemoryCredentialRepository {
    let repository = InMemoryCredentialRepository::new();
    let credential = fast_encryption().encrypt(LTOKEN, PASSPHRASE).unwrap();
    repository.insert(
        USER_ID,
        PROFILE_ID,
        StoredCredential {
            lt_uid: LT_UID,
            credential,
        },
    );
    repository
}

/// Authenticator wired to the given repository and cache
pub fn authenticator_with(repository: Arc<dyn CredentialRepository>, cache: TokenCache) -> Authenticator {
    Authenticator::new(
        Arc::new(AuthenticationMiddleware::default()),
        repository,
        cache,
        fast_encryption(),
    )
}

pub fn submission(correlation_id: CorrelationId, passphrase: &str) -> PassphraseSubmission {
    PassphraseSubmission {
        user_id: USER_ID,
        profile_id: PROFILE_ID,
        correlation_id,
        passphrase: Secret::new(passphrase.to_string()),
        context: None,
    }
}
