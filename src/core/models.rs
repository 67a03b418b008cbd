// Domain models shared between the middleware, the cache and listeners

use crate::core::crypto::EncryptedCredential;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure message for a passphrase that does not open the stored credential
pub const INVALID_PASSPHRASE_MESSAGE: &str = "Invalid passphrase";
/// Failure message for a profile that no longer exists
pub const PROFILE_NOT_FOUND_MESSAGE: &str = "No profile found";
/// Failure message for a stored credential that cannot be parsed
pub const CORRUPTED_CREDENTIAL_MESSAGE: &str = "Stored credential is unreadable";
/// Failure message for a registration evicted before the passphrase arrived
pub const TIMEOUT_MESSAGE: &str = "Authentication timed out";

/// Identifiers of the interaction that delivered the passphrase
///
/// A resumed command responds on this interaction, not on the one that
/// started it: the original interaction may already be closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumedContext {
    pub interaction_id: String,
    pub profile_id: u32,
}

enum Outcome {
    Success {
        lt_uid: u64,
        ltoken: SecretString,
        context: Option<ResumedContext>,
    },
    Failure {
        message: String,
    },
}

/// Result delivered to an [`AuthenticationListener`](crate::core::traits::AuthenticationListener)
///
/// Only constructible through [`AuthenticationResult::success`],
/// [`AuthenticationResult::failure`] and [`AuthenticationResult::timeout`].
pub struct AuthenticationResult {
    user_id: u64,
    outcome: Outcome,
}

impl AuthenticationResult {
    pub fn success(user_id: u64, lt_uid: u64, ltoken: SecretString, context: Option<ResumedContext>) -> Self {
        Self {
            user_id,
            outcome: Outcome::Success { lt_uid, ltoken, context },
        }
    }

    pub fn failure(user_id: u64, message: impl Into<String>) -> Self {
        Self {
            user_id,
            outcome: Outcome::Failure { message: message.into() },
        }
    }

    pub fn timeout(user_id: u64) -> Self {
        Self::failure(user_id, TIMEOUT_MESSAGE)
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn lt_uid(&self) -> Option<u64> {
        match &self.outcome {
            Outcome::Success { lt_uid, .. } => Some(*lt_uid),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn ltoken(&self) -> Option<&SecretString> {
        match &self.outcome {
            Outcome::Success { ltoken, .. } => Some(ltoken),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn resumed_context(&self) -> Option<&ResumedContext> {
        match &self.outcome {
            Outcome::Success { context, .. } => context.as_ref(),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { message } => Some(message.as_str()),
        }
    }
}

impl fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("AuthenticationResult");
        s.field("user_id", &self.user_id);
        match &self.outcome {
            Outcome::Success { lt_uid, context, .. } => s
                .field("success", &true)
                .field("lt_uid", lt_uid)
                .field("ltoken", &"<REDACTED>")
                .field("context", context),
            Outcome::Failure { message } => s.field("success", &false).field("error_message", message),
        };
        s.finish()
    }
}

/// Encrypted credential as held by the external profile store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub lt_uid: u64,
    pub credential: EncryptedCredential,
}

/// A cached value together with its key and current expiry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub expires_at: DateTime<Utc>,
}

/// Passphrase submitted through the secret-entry UI
pub struct PassphraseSubmission {
    pub user_id: u64,
    pub profile_id: u32,
    pub correlation_id: crate::auth::correlation::CorrelationId,
    pub passphrase: SecretString,
    pub context: Option<ResumedContext>,
}

impl fmt::Debug for PassphraseSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseSubmission")
            .field("user_id", &self.user_id)
            .field("profile_id", &self.profile_id)
            .field("correlation_id", &self.correlation_id)
            .field("passphrase", &"<REDACTED>")
            .finish()
    }
}
