//! Operation results: the immutable carrier of either a success value or an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured error record attached to a failed [`OperationResult`].
///
/// Mirrors an `NSError`-shaped error: a domain identifying the subsystem that raised
/// it, a numeric code unique within that domain, a human-readable message, and an
/// optional bag of structured details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub domain: String,
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OperationError {
    #[must_use]
    pub fn new(domain: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The error synthesized by the scheduler for an operation cancelled before dispatch.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new("Workflow", 1, "operation was cancelled before it started")
    }

    /// The error synthesized for an operation whose incoming segues all resolved false.
    #[must_use]
    pub fn skipped() -> Self {
        Self::new("Workflow", 2, "operation was skipped: no incoming segue was satisfied")
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}: {}", self.domain, self.code, self.message)
    }
}

impl std::error::Error for OperationError {}

/// The immutable outcome of an operation: exactly one of a success payload or an error.
///
/// Once constructed, an `OperationResult` never changes. That immutability is load
/// bearing: the scheduler and user code read completed results concurrently with no
/// additional synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationResult {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Failure { error: OperationError },
}

impl OperationResult {
    #[must_use]
    pub fn success(payload: impl Into<Option<serde_json::Value>>) -> Self {
        Self::Success { payload: payload.into() }
    }

    #[must_use]
    pub fn success_empty() -> Self {
        Self::Success { payload: None }
    }

    #[must_use]
    pub fn failure(error: OperationError) -> Self {
        Self::Failure { error }
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The success payload, if this is a `Success` carrying one.
    #[must_use]
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Success { payload } => payload.as_ref(),
            Self::Failure { .. } => None,
        }
    }

    /// The error, if this is a `Failure`.
    #[must_use]
    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}
