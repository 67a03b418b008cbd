// Unit tests for domain models

use auth_relay::core::models::{AuthenticationResult, PassphraseSubmission, ResumedContext, StoredCredential};
use auth_relay::core::crypto::{EncryptedCredential, EncryptionService};
use auth_relay::CorrelationId;
use secrecy::{ExposeSecret, Secret};
use std::num::NonZeroU32;

/// Test success carries the resumed interaction context
#[test]
fn test_success_with_context() {
    let context = ResumedContext {
        interaction_id: "interaction-9".to_string(),
        profile_id: 2,
    };
    let result = AuthenticationResult::success(5, 42, Secret::new("abc123".to_string()), Some(context.clone()));

    assert_eq!(result.resumed_context(), Some(&context));
    assert_eq!(result.ltoken().unwrap().expose_secret(), "abc123");
}

/// Test failures never carry context
#[test]
fn test_failure_has_no_context() {
    let result = AuthenticationResult::failure(5, "No profile found");
    assert!(result.resumed_context().is_none());
    assert_eq!(result.user_id(), 5);
}

/// Test stored credentials serialize the blob as base64 text
#[test]
fn test_stored_credential_json() {
    let service = EncryptionService::with_iterations(NonZeroU32::new(1_000).unwrap());
    let stored = StoredCredential {
        lt_uid: 42,
        credential: service.encrypt("abc123", "hunter2").unwrap(),
    };

    let json = serde_json::to_value(&stored).unwrap();
    assert_eq!(json["lt_uid"], 42);
    assert_eq!(json["credential"].as_str(), Some(stored.credential.to_base64().as_str()));

    let parsed: StoredCredential = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, stored);
}

/// Test a corrupted stored blob fails to deserialize
#[test]
fn test_stored_credential_rejects_bad_blob() {
    let json = serde_json::json!({ "lt_uid": 1, "credential": "%%%" });
    assert!(serde_json::from_value::<StoredCredential>(json).is_err());
}

/// Test submission debug output hides the passphrase
#[test]
fn test_submission_debug_redacts_passphrase() {
    let submission = PassphraseSubmission {
        user_id: 1,
        profile_id: 1,
        correlation_id: CorrelationId::generate(),
        passphrase: Secret::new("hunter2".to_string()),
        context: None,
    };

    let debug_str = format!("{:?}", submission);
    assert!(!debug_str.contains("hunter2"));
    assert!(!debug_str.contains(submission.correlation_id.as_str()));
}

/// Test the blob debug output hides its bytes
#[test]
fn test_encrypted_credential_debug() {
    let credential = EncryptedCredential::from_bytes(vec![0xAB; 44]);
    assert_eq!(format!("{:?}", credential), "EncryptedCredential { len: 44 }");
}
