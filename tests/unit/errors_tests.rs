/*!
 * Tests for the error taxonomy
 */

use storyguard::errors::{CollaboratorError, ModerationError};

#[test]
fn test_invalidTransition_shouldNameEntityAndState() {
    let error = ModerationError::InvalidTransition {
        entity: "deal",
        id: "d1".to_string(),
        from: "active".to_string(),
        action: "reject".to_string(),
    };
    assert_eq!(error.to_string(), "Cannot reject deal d1: already active");
}

#[test]
fn test_isRetryable_shouldOnlyHoldForPersistence() {
    assert!(ModerationError::Persistence("locked".to_string()).is_retryable());
    assert!(!ModerationError::Validation("bad".to_string()).is_retryable());
    assert!(!ModerationError::Authorization("no".to_string()).is_retryable());
    assert!(!ModerationError::not_found("vote", "u1/v1").is_retryable());
}

#[test]
fn test_fromRusqlite_shouldMapToPersistence() {
    let error: ModerationError = rusqlite::Error::QueryReturnedNoRows.into();
    assert!(matches!(error, ModerationError::Persistence(_)));
}

#[test]
fn test_collaboratorError_display() {
    assert_eq!(CollaboratorError::Timeout(10).to_string(), "Service timed out after 10s");
    let bad = CollaboratorError::BadResponse {
        status_code: 503,
        message: "overloaded".to_string(),
    };
    assert_eq!(bad.to_string(), "Service responded with error: 503 - overloaded");
}
