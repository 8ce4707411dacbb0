//! Config monitor error types

use thiserror::Error;

use crate::manager::ManagerError;

/// Result type for config monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Config monitor errors
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("monitor is gone")]
    Dropped,
}
