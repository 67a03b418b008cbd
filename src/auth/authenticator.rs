// Resume protocol glue: cache check, registration, decryption and cache population

use crate::auth::correlation::CorrelationId;
use crate::auth::middleware::{AuthenticationMiddleware, Completion};
use crate::core::crypto::{EncryptedCredential, EncryptionService};
use crate::core::errors::{AuthError, CryptoError};
use crate::core::models::{
    AuthenticationResult, PassphraseSubmission, StoredCredential, CORRUPTED_CREDENTIAL_MESSAGE,
    INVALID_PASSPHRASE_MESSAGE, PROFILE_NOT_FOUND_MESSAGE,
};
use crate::core::traits::{AuthenticationListener, CredentialRepository};
use crate::state::token_cache::{token_cache_key, TokenCache};
use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret, SecretString};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of starting an authenticated command
pub enum AuthOutcome {
    /// A cached token was found; the command can proceed immediately
    Authenticated { lt_uid: u64, ltoken: SecretString },
    /// The caller must prompt for a passphrase carrying this id
    PassphraseRequired { correlation_id: CorrelationId },
}

impl fmt::Debug for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated { lt_uid, .. } => f
                .debug_struct("Authenticated")
                .field("lt_uid", lt_uid)
                .field("ltoken", &"<REDACTED>")
                .finish(),
            Self::PassphraseRequired { correlation_id } => f
                .debug_struct("PassphraseRequired")
                .field("correlation_id", correlation_id)
                .finish(),
        }
    }
}

/// Drives both halves of the resume protocol for command executors
///
/// The begin path (`authenticate`) never leaves a registration behind when it
/// is cancelled: registering is its last step. The submit path
/// (`submit_passphrase`) never writes the cache after cancellation.
pub struct Authenticator {
    middleware: Arc<AuthenticationMiddleware>,
    repository: Arc<dyn CredentialRepository>,
    cache: TokenCache,
    encryption: EncryptionService,
    token_ttl: Duration,
}

impl Authenticator {
    pub fn new(
        middleware: Arc<AuthenticationMiddleware>,
        repository: Arc<dyn CredentialRepository>,
        cache: TokenCache,
        encryption: EncryptionService,
    ) -> Self {
        let token_ttl = cache.default_ttl();
        Self {
            middleware,
            repository,
            cache,
            encryption,
            token_ttl,
        }
    }

    pub fn middleware(&self) -> &Arc<AuthenticationMiddleware> {
        &self.middleware
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Begin an authenticated command for `user_id` on `profile_id`
    ///
    /// A token cache failure is logged and treated as a miss. `listener` is only
    /// registered when a passphrase is actually needed.
    pub async fn authenticate(
        &self,
        user_id: u64,
        profile_id: u32,
        listener: Arc<dyn AuthenticationListener>,
        cancel: &CancellationToken,
    ) -> Result<AuthOutcome, AuthError> {
        let stored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            stored = self.repository.get_encrypted_credential(user_id, profile_id) => stored?,
        };
        let stored = stored.ok_or(AuthError::NotFound { user_id, profile_id })?;

        let key = token_cache_key(user_id, stored.lt_uid);
        let cached = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            cached = self.cache.get::<String>(&key) => cached,
        };

        match cached {
            Ok(Some(token)) => {
                debug!(user_id, profile_id, "Using cached token");
                return Ok(AuthOutcome::Authenticated {
                    lt_uid: stored.lt_uid,
                    ltoken: Secret::new(token),
                });
            }
            Ok(None) => {}
            Err(e) => {
                let e = AuthError::from(e);
                warn!(user_id, profile_id, error = %e, "Treating user as unauthenticated");
            }
        }

        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let correlation_id = self.middleware.register_authentication_listener(user_id, listener);
        Ok(AuthOutcome::PassphraseRequired { correlation_id })
    }

    /// Handle a passphrase submitted for a pending registration
    ///
    /// Stale submissions are dropped before any key derivation runs. Every
    /// definitive outcome (success, wrong passphrase, missing or corrupted
    /// profile) completes the registration. Cancellation and repository
    /// failures return an error and leave the registration in place so the user
    /// can submit again.
    pub async fn submit_passphrase(
        &self,
        submission: PassphraseSubmission,
        cancel: &CancellationToken,
    ) -> Result<Completion, AuthError> {
        let PassphraseSubmission {
            user_id,
            profile_id,
            correlation_id,
            passphrase,
            context,
        } = submission;

        if !self.middleware.is_pending(user_id, &correlation_id) {
            debug!(
                user_id,
                correlation_id = correlation_id.short(),
                "Dropping passphrase for a request that is no longer pending"
            );
            return Ok(Completion::Stale);
        }

        let stored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            stored = self.repository.get_encrypted_credential(user_id, profile_id) => stored?,
        };

        let Some(StoredCredential { lt_uid, credential }) = stored else {
            warn!(user_id, profile_id, "Passphrase submitted for a missing profile");
            let result = AuthenticationResult::failure(user_id, PROFILE_NOT_FOUND_MESSAGE);
            return Ok(self.middleware.complete_authentication(&correlation_id, result).await);
        };

        let decrypted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            decrypted = self.encryption.decrypt_async(credential, passphrase) => decrypted,
        };

        let ltoken = match decrypted {
            Ok(ltoken) => ltoken,
            Err(CryptoError::AuthenticationTagMismatch) => {
                warn!(user_id, profile_id, "Invalid passphrase submitted");
                let result = AuthenticationResult::failure(user_id, INVALID_PASSPHRASE_MESSAGE);
                return Ok(self.middleware.complete_authentication(&correlation_id, result).await);
            }
            Err(CryptoError::MalformedCredential(reason)) => {
                error!(user_id, profile_id, reason = %reason, "Stored credential is corrupted");
                let result = AuthenticationResult::failure(user_id, CORRUPTED_CREDENTIAL_MESSAGE);
                return Ok(self.middleware.complete_authentication(&correlation_id, result).await);
            }
            Err(e) => return Err(e.into()),
        };

        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let key = token_cache_key(user_id, lt_uid);
        if let Err(e) = self.cache.set(&key, ltoken.expose_secret(), self.token_ttl).await {
            // The command still resumes; the next one will ask again
            warn!(user_id, key = %key, error = %e, "Failed to cache decrypted token");
        }

        info!(user_id, profile_id, "Passphrase accepted");
        let result = AuthenticationResult::success(user_id, lt_uid, ltoken, context);
        Ok(self.middleware.complete_authentication(&correlation_id, result).await)
    }

    /// Forget the cached token for one game account
    pub async fn sign_out(&self, user_id: u64, lt_uid: u64) -> Result<(), AuthError> {
        self.cache.remove(&token_cache_key(user_id, lt_uid)).await?;
        info!(user_id, lt_uid, "Signed out");
        Ok(())
    }

    /// Encrypt a freshly submitted credential for storage in a new profile
    pub async fn seal_credential(
        &self,
        plaintext: SecretString,
        passphrase: SecretString,
    ) -> Result<EncryptedCredential, AuthError> {
        Ok(self.encryption.encrypt_async(plaintext, passphrase).await?)
    }
}

/// Credential repository held in memory
///
/// Stands in for the profile database in tests and local runs.
#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credentials: DashMap<(u64, u32), StoredCredential>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: u64, profile_id: u32, credential: StoredCredential) {
        self.credentials.insert((user_id, profile_id), credential);
    }

    pub fn remove(&self, user_id: u64, profile_id: u32) -> Option<StoredCredential> {
        self.credentials.remove(&(user_id, profile_id)).map(|(_, credential)| credential)
    }
}

#[async_trait::async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn get_encrypted_credential(
        &self,
        user_id: u64,
        profile_id: u32,
    ) -> Result<Option<StoredCredential>, AuthError> {
        Ok(self
            .credentials
            .get(&(user_id, profile_id))
            .map(|entry| entry.value().clone()))
    }
}
