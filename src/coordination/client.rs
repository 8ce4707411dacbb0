//! Coordination client capability
//!
//! The control plane consumes a hierarchical coordination service with
//! persistent and ephemeral nodes, one-shot deletion watches and session
//! lifecycle callbacks. Callbacks arrive on the client's own notification
//! thread, never on the thread that issued the triggering operation.

use std::sync::Arc;

use super::errors::{CoordinationError, CoordinationResult};

/// Identifier of a registered watch
pub type WatchId = u64;

/// Identifier of a registered session listener
pub type ListenerId = u64;

/// Notification delivered to a node watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The watched node was deleted (explicitly or by session expiry)
    Deleted(String),
}

/// One-shot node watcher
pub type NodeWatcher = Box<dyn FnOnce(NodeEvent) + Send>;

/// Connection state reported to session listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected with a live session
    Connected,
    /// Connection lost; the session may still be alive
    Disconnected,
    /// Session expired; its ephemeral nodes are gone
    Expired,
}

impl SessionState {
    /// Name for observability
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Expired => "expired",
        }
    }
}

/// Session lifecycle callbacks
pub trait SessionListener: Send + Sync {
    /// Connection state changed
    fn on_state_changed(&self, _state: SessionState) {}

    /// A new session replaced an expired one. Ephemeral nodes owned by the
    /// old session are gone and must be re-created.
    fn on_new_session(&self);

    /// A session could not be established. The client retries on its own.
    fn on_session_error(&self, error: &CoordinationError);
}

/// Coordination service capability
pub trait CoordinationClient: Send + Sync {
    /// Create a persistent node. With `create_parents`, missing ancestors are
    /// created and an existing node is not an error.
    fn create_persistent(&self, path: &str, create_parents: bool) -> CoordinationResult<()>;

    /// Create an ephemeral node owned by the current session.
    fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> CoordinationResult<()>;

    /// Read a node's payload; `None` if the node does not exist.
    fn read(&self, path: &str) -> CoordinationResult<Option<Vec<u8>>>;

    /// List the names of a node's children.
    fn children(&self, path: &str) -> CoordinationResult<Vec<String>>;

    /// Delete a node. Returns whether a node was removed.
    fn delete(&self, path: &str) -> CoordinationResult<bool>;

    /// Check whether a node exists.
    fn exists(&self, path: &str) -> CoordinationResult<bool>;

    /// Register a one-shot deletion watch. Returns `None` (and registers
    /// nothing) when the node does not exist.
    fn watch_deletion(&self, path: &str, watcher: NodeWatcher) -> CoordinationResult<Option<WatchId>>;

    /// Cancel a watch. Unknown ids are ignored.
    fn unwatch(&self, id: WatchId);

    /// Subscribe to session lifecycle callbacks.
    fn subscribe(&self, listener: Arc<dyn SessionListener>) -> ListenerId;

    /// Remove a session listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);

    /// Close the client; ephemeral nodes of its session are removed.
    fn close(&self);
}
