//! Controller Error Types

use thiserror::Error;

use crate::config::ConfigError;
use crate::coordination::CoordinationError;
use crate::monitor::MonitorError;
use crate::pipeline::PipelineError;

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Process-level controller errors. Any of them during `start` aborts
/// startup.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("front door {name} failed: {reason}")]
    FrontDoor { name: String, reason: String },

    #[error("controller already started")]
    AlreadyStarted,

    #[error("controller is stopped")]
    Stopped,
}
