//! Front door
//!
//! The externally reachable surface of the process (admin API). It opens
//! last during startup and closes first during shutdown.

use super::errors::ControllerResult;
use super::handle::ControlHandle;

/// A request-serving surface driven by the controller
pub trait FrontDoor: Send {
    fn name(&self) -> &'static str;

    /// Start serving. Failure aborts process startup.
    fn open(&mut self, handle: ControlHandle) -> ControllerResult<()>;

    /// Stop serving. Closing a closed door is a no-op.
    fn close(&mut self);
}
