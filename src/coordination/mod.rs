//! Coordination subsystem
//!
//! The control plane's view of the external coordination service:
//! - `CoordinationClient` capability (nodes, watches, session callbacks)
//! - node path layout under a fixed root namespace
//! - self-healing membership markers
//! - an in-process service used for standalone mode and fault-injection tests
//!
//! Missing parents are recovered locally: creation fails with `NoNode`, the
//! parent is created as a persistent node, and creation is retried once.

mod client;
mod errors;
mod membership;
mod memory;
pub mod paths;

pub use client::{
    CoordinationClient, ListenerId, NodeEvent, NodeWatcher, SessionListener, SessionState,
    WatchId,
};
pub use errors::{CoordinationError, CoordinationResult};
pub use membership::MembershipMarker;
pub use memory::{MemoryClient, MemoryCoordination};

/// Create an ephemeral node, creating a missing parent once.
///
/// `NodeExists` is propagated so callers can tell who won a race.
pub fn create_ephemeral_with_parent(
    client: &dyn CoordinationClient,
    path: &str,
    data: &[u8],
) -> CoordinationResult<()> {
    match client.create_ephemeral(path, data.to_vec()) {
        Err(CoordinationError::NoNode(_)) => {
            client.create_persistent(paths::parent(path), true)?;
            client.create_ephemeral(path, data.to_vec())
        }
        other => other,
    }
}

/// Create an ephemeral node idempotently. An existing node is benign.
pub fn ensure_ephemeral(
    client: &dyn CoordinationClient,
    path: &str,
    data: &[u8],
) -> CoordinationResult<()> {
    match create_ephemeral_with_parent(client, path, data) {
        Ok(()) | Err(CoordinationError::NodeExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
