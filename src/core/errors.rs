// Domain error types - typed results for every layer, no secret material in messages

use std::time::Duration;
use thiserror::Error;

/// Errors raised while sealing or opening an encrypted credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Wrong passphrase, or the blob was modified after encryption
    #[error("Authentication tag mismatch")]
    AuthenticationTagMismatch,

    /// The blob cannot be a credential produced by this service (bad encoding, truncated)
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// The cipher refused to seal (should not happen with valid key sizes)
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The blocking task running key derivation was aborted
    #[error("Crypto worker failed: {0}")]
    WorkerFailed(String),
}

/// Token cache and cache backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backend did not answer within the operation timeout
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with an error or is unreachable
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// The circuit breaker is open; the backend is not being called
    #[error("Cache backend unavailable: circuit open")]
    CircuitOpen,

    /// Stored bytes could not be turned back into a value
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Configuration loading and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

/// Errors surfaced by the authentication resume protocol
#[derive(Error, Debug)]
pub enum AuthError {
    /// No stored credential for this user/profile
    #[error("No stored credential for user {user_id}, profile {profile_id}")]
    NotFound { user_id: u64, profile_id: u32 },

    /// The submitted passphrase does not open the stored credential
    #[error("Invalid passphrase")]
    InvalidPassphrase,

    /// The stored credential is corrupted
    #[error("Stored credential is corrupted: {0}")]
    MalformedCredential(String),

    /// The cache backend could not be reached; the caller is treated as unauthenticated
    #[error("Token cache unavailable: {0}")]
    TransientCacheFailure(#[from] CacheError),

    /// The correlation id was already consumed, superseded or expired
    #[error("Authentication request has expired or is invalid")]
    StaleCorrelation,

    /// The credential repository failed
    #[error("Credential repository error: {0}")]
    Repository(String),

    /// The triggering interaction went away before the operation finished
    #[error("Operation cancelled")]
    Cancelled,

    /// Any other crypto failure
    #[error("Cryptographic error: {0}")]
    Crypto(CryptoError),
}

impl From<CryptoError> for AuthError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationTagMismatch => AuthError::InvalidPassphrase,
            CryptoError::MalformedCredential(reason) => AuthError::MalformedCredential(reason),
            other => AuthError::Crypto(other),
        }
    }
}

impl AuthError {
    /// Whether the user can fix this by trying again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidPassphrase
                | AuthError::TransientCacheFailure(_)
                | AuthError::StaleCorrelation
                | AuthError::Cancelled
        )
    }
}
