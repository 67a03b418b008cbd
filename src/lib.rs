// Library root for auth-relay

pub mod auth;
pub mod config;
pub mod core;
pub mod state;

pub use crate::auth::{AuthOutcome, AuthenticationMiddleware, Authenticator, Completion, CorrelationId};
pub use crate::core::crypto::{EncryptedCredential, EncryptionService};
pub use crate::core::errors::{AuthError, CacheError, ConfigError, CryptoError};
pub use crate::core::models::{AuthenticationResult, PassphraseSubmission, ResumedContext, StoredCredential};
pub use crate::core::traits::{AuthenticationListener, CacheBackend, CredentialRepository};
pub use crate::state::token_cache::TokenCache;
