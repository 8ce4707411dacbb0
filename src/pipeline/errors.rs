//! Pipeline Error Types

use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline engine and definition errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No instance config is loaded for the destination
    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("failed to start pipeline for {destination}: {reason}")]
    StartFailed { destination: String, reason: String },

    /// Process-wide engine resources are not started
    #[error("pipeline engine is not started")]
    EngineNotStarted,

    /// No usable pipeline definition could be produced
    #[error("no pipeline definition for {destination}: {reason}")]
    Definition { destination: String, reason: String },
}

impl PipelineError {
    /// Create a definition error.
    pub fn definition(destination: &str, reason: impl Into<String>) -> Self {
        Self::Definition {
            destination: destination.to_string(),
            reason: reason.into(),
        }
    }
}
