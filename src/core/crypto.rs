// Passphrase-derived authenticated encryption: PBKDF2-HMAC-SHA256 key derivation, AES-256-GCM sealing

use crate::core::errors::CryptoError;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2::{self, PBKDF2_HMAC_SHA256};
use secrecy::{ExposeSecret, Secret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

/// Salt length prepended to every blob
pub const SALT_LEN: usize = 16;
/// AES-GCM authentication tag length appended to the ciphertext
pub const TAG_LEN: usize = 16;
/// Derived key length (AES-256)
pub const KEY_LEN: usize = 32;
/// Shortest blob that can hold an empty plaintext
pub const MIN_BLOB_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;
/// Default PBKDF2 work factor
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 150_000;

const DEFAULT_ITERATIONS: NonZeroU32 = match NonZeroU32::new(DEFAULT_PBKDF2_ITERATIONS) {
    Some(n) => n,
    None => panic!("PBKDF2 iterations must be non-zero"),
};

/// Opaque encrypted credential: `salt(16) || nonce(12) || ciphertext || tag(16)`
///
/// Stored and transported as standard base64 text. Never patched in place:
/// re-authentication replaces the whole value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncryptedCredential(Vec<u8>);

impl EncryptedCredential {
    /// Wrap raw blob bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode the base64 transport form
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| CryptoError::MalformedCredential(format!("Invalid base64: {}", e)))
    }

    /// Encode to the base64 transport form
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for EncryptedCredential {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_base64(&value)
    }
}

impl From<EncryptedCredential> for String {
    fn from(value: EncryptedCredential) -> Self {
        value.to_base64()
    }
}

impl fmt::Debug for EncryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedCredential")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Encrypts and decrypts long-lived session credentials with a user passphrase
///
/// Every call to [`EncryptionService::encrypt`] draws a fresh salt and nonce, so the
/// same `(plaintext, passphrase)` pair never produces the same blob twice. The salt
/// feeds PBKDF2, so two users with the same passphrase never share a key.
#[derive(Debug, Clone)]
pub struct EncryptionService {
    iterations: NonZeroU32,
}

impl Default for EncryptionService {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionService {
    /// Create a service using the default PBKDF2 work factor
    pub fn new() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Create a service with a custom PBKDF2 work factor
    ///
    /// Blobs do not record their work factor: decrypting requires the same
    /// iteration count that sealed them.
    pub fn with_iterations(iterations: NonZeroU32) -> Self {
        Self { iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Seal `plaintext` under a key derived from `passphrase`
    pub fn encrypt(&self, plaintext: &str, passphrase: &str) -> Result<EncryptedCredential, CryptoError> {
        debug!("Starting credential encryption");

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);
        trace!("Generated encryption salt and nonce");

        let key = self.sealing_key(passphrase, &salt)?;

        let mut in_out = Zeroizing::new(plaintext.as_bytes().to_vec());
        key.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut *in_out)
            .map_err(|_| CryptoError::EncryptionFailed("AES-GCM seal failed".to_string()))?;

        let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + in_out.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&in_out);

        debug!(blob_len = blob.len(), "Credential encryption completed");
        Ok(EncryptedCredential(blob))
    }

    /// Open a blob sealed by [`EncryptionService::encrypt`]
    ///
    /// Returns [`CryptoError::AuthenticationTagMismatch`] for a wrong passphrase or any
    /// modification of the blob, and [`CryptoError::MalformedCredential`] when the blob
    /// is too short to have been produced by this service.
    pub fn decrypt(&self, credential: &EncryptedCredential, passphrase: &str) -> Result<SecretString, CryptoError> {
        debug!("Starting credential decryption");

        let blob = credential.as_bytes();
        if blob.len() < MIN_BLOB_LEN {
            warn!(
                actual_len = blob.len(),
                min_len = MIN_BLOB_LEN,
                "Decryption failed: payload too short"
            );
            return Err(CryptoError::MalformedCredential(format!(
                "payload too short ({} bytes, expected at least {})",
                blob.len(),
                MIN_BLOB_LEN
            )));
        }

        let (salt, rest) = blob.split_at(SALT_LEN);
        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        let key = self.sealing_key(passphrase, salt)?;

        let mut in_out = Zeroizing::new(sealed.to_vec());
        let plaintext = match key.open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out[..]) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                warn!("Authentication tag mismatch during decryption - likely wrong passphrase");
                return Err(CryptoError::AuthenticationTagMismatch);
            }
        };
        trace!("AES-GCM decryption successful");

        let text = std::str::from_utf8(plaintext)
            .map_err(|_| CryptoError::MalformedCredential("plaintext is not UTF-8".to_string()))?
            .to_owned();

        debug!("Credential decryption completed");
        Ok(Secret::new(text))
    }

    /// [`EncryptionService::encrypt`] on the blocking pool
    pub async fn encrypt_async(
        &self,
        plaintext: SecretString,
        passphrase: SecretString,
    ) -> Result<EncryptedCredential, CryptoError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || {
            service.encrypt(plaintext.expose_secret(), passphrase.expose_secret())
        })
        .await
        .map_err(|e| CryptoError::WorkerFailed(e.to_string()))?
    }

    /// [`EncryptionService::decrypt`] on the blocking pool
    ///
    /// Key derivation is deliberately slow; running it inline would stall the
    /// runtime worker that dispatched the submission.
    pub async fn decrypt_async(
        &self,
        credential: EncryptedCredential,
        passphrase: SecretString,
    ) -> Result<SecretString, CryptoError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.decrypt(&credential, passphrase.expose_secret()))
            .await
            .map_err(|e| CryptoError::WorkerFailed(e.to_string()))?
    }

    fn sealing_key(&self, passphrase: &str, salt: &[u8]) -> Result<LessSafeKey, CryptoError> {
        let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            PBKDF2_HMAC_SHA256,
            self.iterations,
            salt,
            passphrase.as_bytes(),
            &mut key_bytes[..],
        );

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes[..])
            .map_err(|_| CryptoError::EncryptionFailed("invalid AES-256 key length".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}
