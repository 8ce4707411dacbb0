//! Lifecycle actions
//!
//! The four operations config monitors and the controller apply to a
//! destination. Every action is idempotent for repeated calls in the same
//! logical state. A failed action is abandoned: the destination keeps its
//! last state and the next reconciliation or a manual call retries.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coordination::CoordinationError;
use crate::election::ElectionError;
use crate::pipeline::PipelineError;

/// Result type for lifecycle actions
pub type ActionResult<T> = Result<T, ActionError>;

/// Why a lifecycle action was abandoned
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Election(#[from] ElectionError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// The controller has been stopped
    #[error("controller is stopped")]
    ControllerStopped,
}

/// Start/stop/reload/release, keyed by destination
pub trait LifecycleActions: Send + Sync {
    /// Make sure a config is loaded and enter the election. Activation is not
    /// guaranteed; the pipeline runs once this process wins.
    fn start(&self, destination: &str) -> ActionResult<()>;

    /// Forceful teardown after the destination's config was removed.
    fn stop(&self, destination: &str) -> ActionResult<()>;

    /// `stop` followed by `start`.
    fn reload(&self, destination: &str) -> ActionResult<()>;

    /// Hand leadership to a peer; without a peer, fall back to a forced stop.
    fn release(&self, destination: &str) -> ActionResult<()>;
}
