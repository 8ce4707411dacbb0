//! Configuration Error Types

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors. All of them are fatal at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    /// A destination's mode is not one of the supported modes
    #[error("unsupported instance mode '{mode}' for {scope}")]
    UnsupportedMode { mode: String, scope: String },
}

impl ConfigError {
    /// Create an invalid config error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
