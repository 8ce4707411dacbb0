//! Election Error Types

use std::fmt;

use thiserror::Error;

use crate::coordination::CoordinationError;
use crate::pipeline::PipelineError;

/// Election error type
#[derive(Debug, Clone)]
pub struct ElectionError {
    /// Error kind
    pub kind: ElectionErrorKind,
    /// Error message
    pub message: String,
}

/// Election error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionErrorKind {
    /// Forbidden state transition attempted
    ForbiddenTransition,

    /// Operation requires the unit to hold leadership
    NotActive,

    /// A lifecycle hook failed
    HookFailed,
}

impl ElectionError {
    /// Create a new election error.
    pub fn new(kind: ElectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a forbidden transition error.
    pub fn forbidden_transition(from: &str, to: &str) -> Self {
        Self::new(
            ElectionErrorKind::ForbiddenTransition,
            format!("forbidden transition: {} → {}", from, to),
        )
    }

    /// Create a not active error.
    pub fn not_active(destination: &str) -> Self {
        Self::new(
            ElectionErrorKind::NotActive,
            format!("destination {} is not active in this process", destination),
        )
    }

    /// Create a hook failed error.
    pub fn hook_failed(hook: &str, source: &HookError) -> Self {
        Self::new(
            ElectionErrorKind::HookFailed,
            format!("{} failed: {}", hook, source),
        )
    }
}

impl fmt::Display for ElectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElectionError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ElectionError {}

/// Result type for election operations
pub type ElectionResult<T> = Result<T, ElectionError>;

/// Failure reported by a lifecycle hook
#[derive(Debug, Clone, Error)]
pub enum HookError {
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result type for lifecycle hooks
pub type HookResult<T> = Result<T, HookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ElectionError::not_active("orders");
        assert_eq!(err.kind, ElectionErrorKind::NotActive);
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_hook_failed_wraps_source() {
        let source = HookError::from(CoordinationError::Closed);
        let err = ElectionError::hook_failed("on_register", &source);
        assert_eq!(err.kind, ElectionErrorKind::HookFailed);
        assert!(err.message.contains("coordination client closed"));
    }
}
