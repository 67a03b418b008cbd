// Unguessable correlation ids linking a passphrase prompt to the waiting command

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

const CORRELATION_ID_BYTES: usize = 32;
const COMPONENT_SEPARATOR: char = ':';

/// Capability token for one pending authentication
///
/// 256 bits from the OS RNG, URL-safe base64 without padding. Holding the id is
/// what authorizes a completion, so ids are compared in constant time and only a
/// short prefix is ever printed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CORRELATION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap an id received back from a UI component
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the id from a `"<purpose>:<correlationId>:<profileId>"` component identifier
    ///
    /// Returns `None` unless the identifier has exactly three non-empty segments.
    pub fn from_component_id(component_id: &str) -> Option<Self> {
        let mut parts = component_id.split(COMPONENT_SEPARATOR);
        let (purpose, id, profile) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || purpose.is_empty() || id.is_empty() || profile.is_empty() {
            return None;
        }
        Some(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &CorrelationId) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }

    /// First characters only; safe for logs
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

/// Build the component identifier embedded in a passphrase prompt
pub fn component_id(purpose: &str, correlation_id: &CorrelationId, profile_id: u32) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        purpose,
        correlation_id.as_str(),
        profile_id,
        sep = COMPONENT_SEPARATOR
    )
}

/// Profile id segment of a component identifier
pub fn profile_id_from_component_id(component_id: &str) -> Option<u32> {
    CorrelationId::from_component_id(component_id)?;
    component_id.rsplit(COMPONENT_SEPARATOR).next()?.parse().ok()
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({}…)", self.short())
    }
}
