//! Coordination Error Types

use thiserror::Error;

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Coordination service errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The node already exists. Benign under concurrent election.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// The node (or its parent) does not exist
    #[error("no such node: {0}")]
    NoNode(String),

    /// The service cannot be reached; the client keeps reconnecting
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    /// A session could not be established
    #[error("session establishment failed: {0}")]
    SessionError(String),

    /// The client was closed
    #[error("coordination client closed")]
    Closed,
}

impl CoordinationError {
    /// Transient errors are logged and left to the client's reconnection.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::SessionError(_))
    }
}
