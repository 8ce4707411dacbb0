//! Self-healing membership markers
//!
//! A membership marker is an ephemeral node advertising that this server
//! participates in a cluster (process-wide or for one destination). The
//! coordination service removes it when the session expires, so the marker
//! subscribes to session events and re-creates itself on every new session.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::client::{CoordinationClient, ListenerId, SessionListener, SessionState};
use super::errors::{CoordinationError, CoordinationResult};
use super::ensure_ephemeral;
use crate::observability::{log_event_with_fields, Event, Logger};

/// An idempotent ephemeral marker that survives session loss.
pub struct MembershipMarker {
    client: Arc<dyn CoordinationClient>,
    path: String,
    data: Vec<u8>,
    listener: Mutex<Option<ListenerId>>,
}

impl MembershipMarker {
    /// Create a marker for `path`; nothing is written until `register`.
    pub fn new(client: Arc<dyn CoordinationClient>, path: String, data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            client,
            path,
            data,
            listener: Mutex::new(None),
        })
    }

    /// Marker path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create the marker and keep it alive across sessions.
    ///
    /// Re-registering an existing marker is benign.
    pub fn register(self: &Arc<Self>) -> CoordinationResult<()> {
        ensure_ephemeral(self.client.as_ref(), &self.path, &self.data)?;

        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_none() {
            let restorer = Arc::new(MarkerRestorer {
                marker: Arc::downgrade(self),
            });
            *listener = Some(self.client.subscribe(restorer));
        }

        log_event_with_fields(Event::MembershipRegistered, &[("path", &self.path)]);
        Ok(())
    }

    /// Stop restoring the marker and remove it.
    pub fn deregister(&self) -> CoordinationResult<()> {
        if let Some(id) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.client.unsubscribe(id);
        }

        match self.client.delete(&self.path) {
            Ok(_) | Err(CoordinationError::NoNode(_)) => {
                log_event_with_fields(Event::MembershipReleased, &[("path", &self.path)]);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the marker is currently kept alive
    pub fn is_registered(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn restore(&self) {
        match ensure_ephemeral(self.client.as_ref(), &self.path, &self.data) {
            Ok(()) => log_event_with_fields(Event::MembershipRestored, &[("path", &self.path)]),
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::CoordinationUnavailable,
                    &[("path", &self.path), ("reason", &reason)],
                );
            }
        }
    }
}

struct MarkerRestorer {
    marker: Weak<MembershipMarker>,
}

impl SessionListener for MarkerRestorer {
    fn on_state_changed(&self, state: SessionState) {
        if let Some(marker) = self.marker.upgrade() {
            Logger::trace(
                "COORDINATION_STATE_CHANGED",
                &[("path", &marker.path), ("state", state.as_str())],
            );
        }
    }

    fn on_new_session(&self) {
        if let Some(marker) = self.marker.upgrade() {
            marker.restore();
        }
    }

    fn on_session_error(&self, error: &CoordinationError) {
        let reason = error.to_string();
        log_event_with_fields(Event::SessionError, &[("reason", &reason)]);
    }
}
