/*!
 * Error types for the storyguard pipeline.
 *
 * `ModerationError` is what callers of the public services see.
 * `CollaboratorError` describes best-effort external checks (similarity,
 * image analysis) that degrade to flags instead of failing a validation.
 */

use thiserror::Error;

/// Errors surfaced by the moderation, validation, rating and deal services
#[derive(Error, Debug)]
pub enum ModerationError {
    /// Malformed input: missing content, rating out of range, bad percentage
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Actor lacks the required capability or identity match
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. "queue entry", "deal")
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Transition attempted from a state that does not allow it
    #[error("Cannot {action} {entity} {id}: already {from}")]
    InvalidTransition {
        /// Entity kind
        entity: &'static str,
        /// Entity identifier
        id: String,
        /// Current state
        from: String,
        /// Attempted action
        action: String,
    },

    /// Store unavailable or a query failed
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ModerationError {
    /// Shorthand for a `NotFound` error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<anyhow::Error> for ModerationError {
    fn from(error: anyhow::Error) -> Self {
        Self::Persistence(format!("{:#}", error))
    }
}

impl From<rusqlite::Error> for ModerationError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Soft failures from external collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Service could not be reached
    #[error("Service unreachable: {0}")]
    Unreachable(String),

    /// Service did not answer in time
    #[error("Service timed out after {0}s")]
    Timeout(u64),

    /// Service answered with a non-success status
    #[error("Service responded with error: {status_code} - {message}")]
    BadResponse {
        /// HTTP status code
        status_code: u16,
        /// Error body
        message: String,
    },

    /// Service answer could not be decoded
    #[error("Failed to parse service response: {0}")]
    Parse(String),

    /// No endpoint configured for this collaborator
    #[error("Service not configured")]
    NotConfigured,
}

/// Result alias used across the services
pub type ModerationResult<T> = std::result::Result<T, ModerationError>;
