//! Remote manager error types

use thiserror::Error;

/// Result type for remote manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors talking to a remote configuration manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The manager answered with a non-zero envelope code
    #[error("manager returned code {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("failed to parse response from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("destination {0} is not known to the manager")]
    NotFound(String),
}
