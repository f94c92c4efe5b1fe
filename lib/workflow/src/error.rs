//! Error types for workflow construction and validation.
//!
//! Two layers, matching the two error classes a caller can actually observe:
//! - [`WorkflowBuildError`]: misuse of the builder API while the workflow is not idle,
//!   surfaced synchronously from `add_operation`/`add_dependency`/`add_segue`/`start`.
//! - [`ValidationError`]: the graph-shape failures detected inside `start`, surfaced
//!   through `Workflow::error()` and the delegate's `did_fail_with_error`.
//!
//! Neither type reaches for `rootcause::Report` the way `lib/core`'s doc comments
//! gesture at: each is a plain enum with a manual `Display` and `std::error::Error`
//! impl, matching every other error type actually exercised in this workspace.

use std::fmt;

/// The fixed error domain every [`ValidationError`] reports.
pub const VALIDATION_ERROR_DOMAIN: &str = "WEWorkflow";

/// Graph-shape and resolution failures detected during [`crate::Workflow::start`].
///
/// Each variant carries a fixed numeric code within [`VALIDATION_ERROR_DOMAIN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A dependency descriptor's source or target endpoint did not resolve.
    InvalidDependency { detail: String },
    /// A segue descriptor's source or target endpoint did not resolve.
    InvalidSegue { detail: String },
    /// The union of dependency and segue edges contains a cycle.
    DependencyCycle,
    /// Two operations were added under the same non-null name.
    DuplicateNames { name: String },
    /// Operations remain but none can become ready: the dispatch loop drained
    /// without every operation reaching a terminal (finished or skipped) state.
    Deadlocked { remaining: Vec<String> },
}

impl ValidationError {
    /// The fixed numeric code for this variant, within [`VALIDATION_ERROR_DOMAIN`].
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidDependency { .. } => 1,
            Self::DependencyCycle => 2,
            Self::Deadlocked { .. } => 3,
            Self::DuplicateNames { .. } => 4,
            Self::InvalidSegue { .. } => 5,
        }
    }

    #[must_use]
    pub fn domain(&self) -> &'static str {
        VALIDATION_ERROR_DOMAIN
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDependency { detail } => write!(f, "invalid dependency: {detail}"),
            Self::InvalidSegue { detail } => write!(f, "invalid segue: {detail}"),
            Self::DependencyCycle => write!(f, "dependency graph contains a cycle"),
            Self::DuplicateNames { name } => write!(f, "duplicate operation name: {name}"),
            Self::Deadlocked { remaining } => write!(
                f,
                "workflow deadlocked with {} operation(s) never reaching a terminal state: {}",
                remaining.len(),
                remaining.join(", ")
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Misuse of the builder API: adding operations or edges while not idle, or adding
/// the same operation twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowBuildError {
    /// `add_operation`/`add_dependency`/`add_segue`/`start` called after `start` already ran.
    NotIdle,
    /// The same operation (by pointer identity) was added more than once.
    DuplicateOperation,
}

impl fmt::Display for WorkflowBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotIdle => {
                write!(f, "workflow is no longer idle: builder methods are only valid before start")
            }
            Self::DuplicateOperation => write!(f, "operation was already added to this workflow"),
        }
    }
}

impl std::error::Error for WorkflowBuildError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_codes_are_stable() {
        assert_eq!(ValidationError::InvalidDependency { detail: String::new() }.code(), 1);
        assert_eq!(ValidationError::DependencyCycle.code(), 2);
        assert_eq!(ValidationError::Deadlocked { remaining: vec![] }.code(), 3);
        assert_eq!(ValidationError::DuplicateNames { name: String::new() }.code(), 4);
        assert_eq!(ValidationError::InvalidSegue { detail: String::new() }.code(), 5);
    }

    #[test]
    fn validation_error_domain_is_fixed() {
        assert_eq!(ValidationError::DependencyCycle.domain(), "WEWorkflow");
    }

    #[test]
    fn display_messages_are_non_empty() {
        let errors = vec![
            ValidationError::InvalidDependency { detail: "x".into() },
            ValidationError::InvalidSegue { detail: "y".into() },
            ValidationError::DependencyCycle,
            ValidationError::DuplicateNames { name: "dup".into() },
            ValidationError::Deadlocked { remaining: vec!["c".into()] },
        ];
        for e in errors {
            assert!(!e.to_string().is_empty());
        }
    }

    #[test]
    fn build_error_display() {
        assert!(WorkflowBuildError::NotIdle.to_string().contains("idle"));
        assert!(WorkflowBuildError::DuplicateOperation.to_string().contains("already"));
    }
}
