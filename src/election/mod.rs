//! Election subsystem
//!
//! Per-destination active/standby leadership over the coordination service:
//! - `ElectionState`: explicit state machine with forbidden transitions
//! - `ElectionUnit`: one per destination, drives the state machine from
//!   direct calls and coordination callbacks
//! - `LifecycleHooks`: register / become-active / resign-active / deregister
//! - `UnitRegistry`: get-or-create map of units
//!
//! Session recovery: membership markers are re-created on every new session;
//! an active unit whose leadership node survived keeps it without a second
//! creation attempt.

mod errors;
mod hooks;
mod identity;
mod registry;
mod state;
mod unit;

pub use errors::{ElectionError, ElectionErrorKind, ElectionResult, HookError, HookResult};
pub use hooks::{ClusterHooks, LifecycleHooks};
pub use identity::{RunningData, ServerIdentity};
pub use registry::UnitRegistry;
pub use state::ElectionState;
pub use unit::ElectionUnit;
