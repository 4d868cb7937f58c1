//! Error types for the lifecycle handlers and engines
//!
//! [`TrackerError`] is what callers match on. [`ErrorResponse`] is the
//! structured shape handed to an outer layer that needs to report a non-2xx
//! result with detail.
//!
//! # Example Response
//! ```json
//! {
//!   "code": "GOLDEN_RULE_VIOLATION",
//!   "status": 422,
//!   "error": "Golden rule violated: 1 violation(s)",
//!   "violations": [
//!     { "field": "title", "message": "Request title is required" }
//!   ],
//!   "retryable": false
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::golden_rule::Violation;
use crate::store::StoreError;

/// Result type alias for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors surfaced by the engines and lifecycle handlers
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Golden rule violations; nothing was persisted
    #[error("Golden rule violated: {} violation(s)", violations.len())]
    Validation { violations: Vec<Violation> },

    /// The operation conflicts with the current state (e.g. blocked request)
    #[error("{reason}")]
    Conflict { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested state change is never allowed
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl TrackerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "GOLDEN_RULE_VIOLATION",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Store(_) => "STORAGE_UNAVAILABLE",
        }
    }

    /// HTTP-style status for an outer layer
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 422,
            Self::Conflict { .. } | Self::InvalidTransition { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::InvalidInput { .. } => 400,
            Self::Store(_) => 503,
        }
    }

    /// Whether retrying the same call later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Convert to a structured response
    pub fn to_response(&self) -> ErrorResponse {
        let violations = match self {
            Self::Validation { violations } => violations.clone(),
            _ => Vec::new(),
        };
        ErrorResponse {
            code: self.code().to_string(),
            status: self.status(),
            error: self.to_string(),
            violations,
            retryable: self.is_retryable(),
        }
    }
}

/// Structured error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "CONFLICT")
    pub code: String,

    pub status: u16,

    /// Human-readable message
    pub error: String,

    /// Golden rule violations, verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,

    #[serde(default)]
    pub retryable: bool,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.error)
    }
}

impl std::error::Error for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_response_carries_violations() {
        let err = TrackerError::Validation {
            violations: vec![Violation::new("title", "Request title is required")],
        };
        let response = err.to_response();

        assert_eq!(response.status, 422);
        assert_eq!(response.code, "GOLDEN_RULE_VIOLATION");
        assert_eq!(response.violations.len(), 1);
        assert_eq!(response.violations[0].field, "title");
        assert!(!response.retryable);
    }

    #[test]
    fn test_conflict_message_is_the_reason() {
        let err = TrackerError::conflict("Request is blocked by a red tag and cannot be started");
        assert_eq!(err.status(), 409);
        assert_eq!(
            err.to_response().error,
            "Request is blocked by a red tag and cannot be started"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TrackerError::not_found("Request", "r1").status(), 404);
        assert_eq!(
            TrackerError::InvalidTransition {
                entity: "request",
                from: "OPEN".into(),
                to: "BLOCKED".into()
            }
            .status(),
            409
        );
        let store_err = TrackerError::from(StoreError::LockPoisoned);
        assert_eq!(store_err.status(), 503);
        assert!(store_err.is_retryable());
    }

    #[test]
    fn test_response_omits_empty_violations() {
        let value = serde_json::to_value(TrackerError::not_found("Request", "r1").to_response())
            .unwrap();
        assert!(value.get("violations").is_none());
        assert_eq!(value["error"], "Request not found: r1");
    }
}
