//! Per-destination leader election
//!
//! One `ElectionUnit` exists per destination per process. Leadership is an
//! ephemeral node at `paths::running_node(destination)`; whoever creates it
//! runs the destination's pipeline. Standby units watch the node and retry
//! creation whenever it disappears, without timeout, until stopped.
//!
//! Every state change happens under the unit's own lock, whether triggered
//! by a direct call or by a coordination callback. Units never share a lock.
//! Callbacks carry the watch epoch they were armed with and are discarded
//! once the epoch has moved on.
//!
//! A step cut short by an unreachable service is marked pending and resumed
//! when the session reports `Connected` again.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use super::errors::{ElectionError, ElectionResult, HookError};
use super::hooks::LifecycleHooks;
use super::identity::{RunningData, ServerIdentity};
use super::state::ElectionState;
use crate::coordination::{
    create_ephemeral_with_parent, paths, CoordinationClient, CoordinationError,
    CoordinationResult, ListenerId, NodeWatcher, SessionListener, SessionState, WatchId,
};
use crate::observability::{log_destination_event, Event, Logger};

#[derive(Default)]
struct UnitInner {
    state: ElectionState,
    epoch: u64,
    watch: Option<WatchId>,
    listener: Option<ListenerId>,
    /// An election step was interrupted by an outage
    pending: bool,
}

/// Leader election state machine for one destination
pub struct ElectionUnit {
    destination: String,
    identity: ServerIdentity,
    client: Arc<dyn CoordinationClient>,
    hooks: Arc<dyn LifecycleHooks>,
    /// Pause between giving up leadership and the single re-election attempt
    release_grace: Duration,
    running_path: String,
    inner: Mutex<UnitInner>,
    /// Lock-free copy of `inner.state`
    mirror: AtomicU8,
    this: Weak<ElectionUnit>,
}

impl ElectionUnit {
    /// Create an idle unit with its hooks bound.
    pub fn new(
        destination: impl Into<String>,
        identity: ServerIdentity,
        client: Arc<dyn CoordinationClient>,
        hooks: Arc<dyn LifecycleHooks>,
        release_grace: Duration,
    ) -> Arc<Self> {
        let destination = destination.into();
        let running_path = paths::running_node(&destination);
        Arc::new_cyclic(|this| Self {
            destination,
            identity,
            client,
            hooks,
            release_grace,
            running_path,
            inner: Mutex::new(UnitInner::default()),
            mirror: AtomicU8::new(ElectionState::Idle.to_u8()),
            this: this.clone(),
        })
    }

    /// Destination this unit elects for
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Current state (non-blocking)
    pub fn state(&self) -> ElectionState {
        ElectionState::from_u8(self.mirror.load(Ordering::SeqCst))
    }

    /// Whether this process holds leadership (non-blocking)
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Whether the unit has been started (non-blocking)
    pub fn is_started(&self) -> bool {
        self.state().is_started()
    }

    /// Current holder of the leadership node, if any
    pub fn holder(&self) -> Option<RunningData> {
        self.client
            .read(&self.running_path)
            .ok()
            .flatten()
            .and_then(|payload| RunningData::from_bytes(&payload))
    }

    /// Enter the race for leadership.
    ///
    /// Valid from `Idle` only. Runs `on_register`, then tries to create the
    /// leadership node; on conflict the unit stays `Registering` and waits.
    pub fn start(&self) -> ElectionResult<()> {
        let mut inner = self.lock();
        let next = inner.state.begin_registration()?;
        self.set_state(&mut inner, next);
        log_destination_event(
            Event::ElectionRegistering,
            &self.destination,
            &[("address", self.identity.address())],
        );

        if let Err(e) = self.hooks.on_register() {
            self.log_hook_failure("on_register", &e);
            self.set_state(&mut inner, ElectionState::Idle);
            return Err(ElectionError::hook_failed("on_register", &e));
        }

        if inner.listener.is_none() {
            let listener = Arc::new(LeadershipListener {
                unit: self.this.clone(),
            });
            inner.listener = Some(self.client.subscribe(listener));
        }

        self.attempt(&mut inner)
    }

    /// Leave the race. A no-op on an idle unit.
    ///
    /// An active unit resigns first and then deletes its leadership node.
    pub fn stop(&self) -> ElectionResult<()> {
        let mut inner = self.lock();
        if !inner.state.is_started() {
            return Ok(());
        }

        self.cancel_watch(&mut inner);
        inner.pending = false;
        if inner.state.is_active() {
            if let Err(e) = self.hooks.on_resign_active() {
                self.log_hook_failure("on_resign_active", &e);
            }
            self.delete_if_ours();
        }

        let next = inner.state.stop()?;
        self.set_state(&mut inner, next);
        self.unsubscribe(&mut inner);

        if let Err(e) = self.hooks.on_deregister() {
            self.log_hook_failure("on_deregister", &e);
        }
        log_destination_event(Event::ElectionStopped, &self.destination, &[]);
        Ok(())
    }

    /// Give up leadership while staying a cluster member.
    ///
    /// After `release_grace` the unit makes one election attempt. Returns
    /// `true` if a peer took over and `false` if this process won again (no
    /// peer available; callers fall back to a full stop).
    pub fn release(&self) -> ElectionResult<bool> {
        let epoch = {
            let mut inner = self.lock();
            if !inner.state.is_active() {
                return Err(ElectionError::not_active(&self.destination));
            }

            self.cancel_watch(&mut inner);
            if let Err(e) = self.hooks.on_resign_active() {
                self.log_hook_failure("on_resign_active", &e);
            }
            self.delete_if_ours();
            let next = inner.state.resign()?;
            self.set_state(&mut inner, next);

            let peers = self.peer_count().to_string();
            log_destination_event(
                Event::ElectionReleased,
                &self.destination,
                &[("peers", &peers)],
            );
            inner.epoch
        };

        if !self.release_grace.is_zero() {
            thread::sleep(self.release_grace);
        }

        let mut inner = self.lock();
        if inner.epoch == epoch && inner.state == ElectionState::Registering {
            self.attempt(&mut inner)?;
        }
        Ok(!inner.state.is_active())
    }

    // =========================================================================
    // ELECTION
    // =========================================================================

    fn attempt(&self, inner: &mut UnitInner) -> ElectionResult<()> {
        let payload = self.identity.running_data().to_bytes();
        loop {
            match create_ephemeral_with_parent(self.client.as_ref(), &self.running_path, &payload) {
                Ok(()) => return self.activate(inner),
                Err(CoordinationError::NodeExists(_)) => {}
                Err(e) => {
                    self.defer(inner, &e);
                    return Ok(());
                }
            }

            let holder = match self.client.read(&self.running_path) {
                Ok(Some(data)) if self.identity.owns(&data) => return self.activate(inner),
                Ok(Some(data)) => RunningData::from_bytes(&data)
                    .map(|d| d.address)
                    .unwrap_or_default(),
                Ok(None) => continue,
                Err(e) => {
                    self.defer(inner, &e);
                    return Ok(());
                }
            };

            match self.arm_watch(inner) {
                Ok(true) => {
                    inner.pending = false;
                    log_destination_event(
                        Event::ElectionStandby,
                        &self.destination,
                        &[("holder", &holder)],
                    );
                    return Ok(());
                }
                // Vanished between create and watch
                Ok(false) => continue,
                Err(e) => {
                    self.defer(inner, &e);
                    return Ok(());
                }
            }
        }
    }

    fn activate(&self, inner: &mut UnitInner) -> ElectionResult<()> {
        let next = inner.state.become_active()?;
        self.set_state(inner, next);

        if let Err(e) = self.hooks.on_become_active() {
            let reason = e.to_string();
            log_destination_event(
                Event::PipelineStartFailed,
                &self.destination,
                &[("reason", &reason)],
            );
            self.abandon(inner);
            return Err(ElectionError::hook_failed("on_become_active", &e));
        }

        log_destination_event(
            Event::ElectionActive,
            &self.destination,
            &[("address", self.identity.address())],
        );

        self.guard_leadership(inner)
    }

    /// Watch our own leadership node, or give it up if it is already gone.
    fn guard_leadership(&self, inner: &mut UnitInner) -> ElectionResult<()> {
        match self.arm_watch(inner) {
            Ok(true) => {
                inner.pending = false;
                Ok(())
            }
            Ok(false) => self.handle_lost(inner),
            Err(e) => {
                self.defer(inner, &e);
                Ok(())
            }
        }
    }

    /// Re-derive the unit's position from the service after watches may
    /// have been lost. Never re-creates leadership while it is still ours.
    fn resync(&self, inner: &mut UnitInner) -> ElectionResult<()> {
        inner.pending = false;
        match inner.state {
            ElectionState::Idle => Ok(()),
            ElectionState::Registering => {
                self.cancel_watch(inner);
                self.attempt(inner)
            }
            ElectionState::Active => match self.client.read(&self.running_path) {
                Ok(Some(data)) if self.identity.owns(&data) => self.guard_leadership(inner),
                Ok(_) => self.handle_lost(inner),
                Err(e) => {
                    self.defer(inner, &e);
                    Ok(())
                }
            },
        }
    }

    /// Leadership node disappeared underneath an active unit.
    fn handle_lost(&self, inner: &mut UnitInner) -> ElectionResult<()> {
        log_destination_event(Event::ElectionLost, &self.destination, &[]);
        self.cancel_watch(inner);
        if let Err(e) = self.hooks.on_resign_active() {
            self.log_hook_failure("on_resign_active", &e);
        }
        let next = inner.state.resign()?;
        self.set_state(inner, next);
        self.attempt(inner)
    }

    /// Pipeline could not start: give leadership back and go idle.
    fn abandon(&self, inner: &mut UnitInner) {
        self.cancel_watch(inner);
        self.delete_if_ours();
        self.unsubscribe(inner);
        if let Err(e) = self.hooks.on_deregister() {
            self.log_hook_failure("on_deregister", &e);
        }
        self.set_state(inner, ElectionState::Idle);
        log_destination_event(
            Event::ElectionStopped,
            &self.destination,
            &[("reason", "pipeline start failed")],
        );
    }

    // =========================================================================
    // COORDINATION CALLBACKS
    // =========================================================================

    fn on_running_deleted(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            Logger::trace(
                "ELECTION_STALE_CALLBACK",
                &[("destination", &self.destination)],
            );
            return;
        }
        inner.watch = None;

        let result = match inner.state {
            ElectionState::Registering => self.attempt(&mut inner),
            ElectionState::Active => self.handle_lost(&mut inner),
            ElectionState::Idle => Ok(()),
        };
        self.log_callback_result("running_deleted", result);
    }

    /// A new session replaced an expired one; the old session's watches are
    /// gone. An active unit keeps leadership if its node survived.
    fn on_new_session(&self) {
        let mut inner = self.lock();
        let result = self.resync(&mut inner);
        self.log_callback_result("new_session", result);
    }

    /// Connection came back within the same session.
    fn on_reconnected(&self) {
        let mut inner = self.lock();
        if !inner.pending {
            return;
        }
        let result = self.resync(&mut inner);
        self.log_callback_result("reconnected", result);
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, UnitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut UnitInner, state: ElectionState) {
        inner.state = state;
        self.mirror.store(state.to_u8(), Ordering::SeqCst);
    }

    fn arm_watch(&self, inner: &mut UnitInner) -> CoordinationResult<bool> {
        self.cancel_watch(inner);
        let epoch = inner.epoch;
        let unit = self.this.clone();
        let watcher: NodeWatcher = Box::new(move |_event| {
            if let Some(unit) = unit.upgrade() {
                unit.on_running_deleted(epoch);
            }
        });

        match self.client.watch_deletion(&self.running_path, watcher)? {
            Some(id) => {
                inner.watch = Some(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn cancel_watch(&self, inner: &mut UnitInner) {
        inner.epoch += 1;
        if let Some(id) = inner.watch.take() {
            self.client.unwatch(id);
        }
    }

    fn unsubscribe(&self, inner: &mut UnitInner) {
        if let Some(id) = inner.listener.take() {
            self.client.unsubscribe(id);
        }
    }

    fn delete_if_ours(&self) {
        let result = match self.client.read(&self.running_path) {
            Ok(Some(data)) if self.identity.owns(&data) => {
                self.client.delete(&self.running_path).map(|_| ())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.log_unavailable(&e);
        }
    }

    fn peer_count(&self) -> usize {
        self.client
            .children(&paths::destination_cluster_root(&self.destination))
            .map(|members| {
                members
                    .iter()
                    .filter(|m| m.as_str() != self.identity.address())
                    .count()
            })
            .unwrap_or(0)
    }

    fn defer(&self, inner: &mut UnitInner, error: &CoordinationError) {
        inner.pending = true;
        self.log_unavailable(error);
    }

    fn log_callback_result(&self, callback: &str, result: ElectionResult<()>) {
        if let Err(e) = result {
            let reason = e.to_string();
            log_destination_event(
                Event::ElectionCallbackFailed,
                &self.destination,
                &[("callback", callback), ("reason", &reason)],
            );
        }
    }

    fn log_unavailable(&self, error: &CoordinationError) {
        let reason = error.to_string();
        log_destination_event(
            Event::CoordinationUnavailable,
            &self.destination,
            &[("reason", &reason)],
        );
    }

    fn log_hook_failure(&self, hook: &str, error: &HookError) {
        let reason = error.to_string();
        log_destination_event(
            Event::ElectionHookFailed,
            &self.destination,
            &[("hook", hook), ("reason", &reason)],
        );
    }
}

struct LeadershipListener {
    unit: Weak<ElectionUnit>,
}

impl SessionListener for LeadershipListener {
    fn on_state_changed(&self, state: SessionState) {
        if state == SessionState::Connected {
            if let Some(unit) = self.unit.upgrade() {
                unit.on_reconnected();
            }
        }
    }

    fn on_new_session(&self) {
        if let Some(unit) = self.unit.upgrade() {
            unit.on_new_session();
        }
    }

    fn on_session_error(&self, error: &CoordinationError) {
        if let Some(unit) = self.unit.upgrade() {
            let reason = error.to_string();
            log_destination_event(Event::SessionError, &unit.destination, &[("reason", &reason)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{MemoryClient, MemoryCoordination};
    use crate::election::errors::{ElectionErrorKind, HookResult};
    use crate::pipeline::PipelineError;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingHooks {
        calls: Mutex<Vec<&'static str>>,
        fail_activation: AtomicBool,
    }

    impl RecordingHooks {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl LifecycleHooks for RecordingHooks {
        fn on_register(&self) -> HookResult<()> {
            self.record("register");
            Ok(())
        }

        fn on_become_active(&self) -> HookResult<()> {
            self.record("become_active");
            if self.fail_activation.load(Ordering::SeqCst) {
                return Err(PipelineError::StartFailed {
                    destination: "orders".to_string(),
                    reason: "boom".to_string(),
                }
                .into());
            }
            Ok(())
        }

        fn on_resign_active(&self) -> HookResult<()> {
            self.record("resign_active");
            Ok(())
        }

        fn on_deregister(&self) -> HookResult<()> {
            self.record("deregister");
            Ok(())
        }
    }

    fn unit(
        client: &Arc<MemoryClient>,
        address: &str,
        hooks: &Arc<RecordingHooks>,
    ) -> Arc<ElectionUnit> {
        ElectionUnit::new(
            "orders",
            ServerIdentity::new(address),
            client.clone() as Arc<dyn CoordinationClient>,
            hooks.clone() as Arc<dyn LifecycleHooks>,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_single_unit_becomes_active_and_stops() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        unit.start().unwrap();
        assert!(unit.is_active());
        assert!(service.node_exists(&paths::running_node("orders")));
        assert_eq!(unit.holder().unwrap().address, "10.0.0.1:11111");

        unit.stop().unwrap();
        assert_eq!(unit.state(), ElectionState::Idle);
        assert!(!service.node_exists(&paths::running_node("orders")));
        assert_eq!(
            hooks.calls(),
            vec!["register", "become_active", "resign_active", "deregister"]
        );
    }

    #[test]
    fn test_stop_on_idle_is_noop_and_double_start_is_forbidden() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        unit.stop().unwrap();
        assert!(hooks.calls().is_empty());

        unit.start().unwrap();
        let err = unit.start().unwrap_err();
        assert_eq!(err.kind, ElectionErrorKind::ForbiddenTransition);
    }

    #[test]
    fn test_standby_takes_over_when_holder_dies() {
        let service = MemoryCoordination::new();
        let client_a = service.connect();
        let client_b = service.connect();
        let hooks_a = Arc::new(RecordingHooks::default());
        let hooks_b = Arc::new(RecordingHooks::default());
        let a = unit(&client_a, "10.0.0.1:11111", &hooks_a);
        let b = unit(&client_b, "10.0.0.2:11111", &hooks_b);

        a.start().unwrap();
        b.start().unwrap();
        assert!(a.is_active());
        assert_eq!(b.state(), ElectionState::Registering);

        service.kill(&client_a);
        service.settle();

        assert!(b.is_active());
        assert_eq!(b.holder().unwrap().address, "10.0.0.2:11111");
    }

    #[test]
    fn test_activation_failure_returns_to_idle() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        hooks.fail_activation.store(true, Ordering::SeqCst);
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        let err = unit.start().unwrap_err();
        assert_eq!(err.kind, ElectionErrorKind::HookFailed);
        assert_eq!(unit.state(), ElectionState::Idle);
        assert!(!service.node_exists(&paths::running_node("orders")));
        assert_eq!(hooks.calls(), vec!["register", "become_active", "deregister"]);
    }

    #[test]
    fn test_lost_leadership_is_reacquired_without_peers() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        unit.start().unwrap();
        service.drop_node(&paths::running_node("orders"));
        service.settle();

        assert!(unit.is_active());
        assert_eq!(
            hooks.calls(),
            vec!["register", "become_active", "resign_active", "become_active"]
        );
    }

    #[test]
    fn test_new_session_keeps_surviving_leadership() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        unit.start().unwrap();
        service.notify_new_session(&client);
        service.settle();

        assert!(unit.is_active());
        assert_eq!(hooks.calls(), vec!["register", "become_active"]);
        assert_eq!(service.watch_count(&paths::running_node("orders")), 1);
    }

    #[test]
    fn test_standby_started_during_outage_competes_after_reconnect() {
        let service = MemoryCoordination::new();
        let client_a = service.connect();
        let client_b = service.connect();
        let hooks_a = Arc::new(RecordingHooks::default());
        let hooks_b = Arc::new(RecordingHooks::default());
        let a = unit(&client_a, "10.0.0.1:11111", &hooks_a);
        let b = unit(&client_b, "10.0.0.2:11111", &hooks_b);

        a.start().unwrap();
        service.set_unavailable(&client_b, true);
        b.start().unwrap();
        assert_eq!(b.state(), ElectionState::Registering);
        assert_eq!(service.watch_count(&paths::running_node("orders")), 1);

        service.set_unavailable(&client_b, false);
        service.settle();
        assert_eq!(service.watch_count(&paths::running_node("orders")), 2);

        service.kill(&client_a);
        service.settle();
        assert!(b.is_active());
        assert_eq!(b.holder().unwrap().address, "10.0.0.2:11111");
    }

    #[test]
    fn test_leadership_lost_during_outage_is_retaken_after_reconnect() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        unit.start().unwrap();
        service.set_unavailable(&client, true);
        service.drop_node(&paths::running_node("orders"));
        service.settle();
        assert_eq!(unit.state(), ElectionState::Registering);

        service.set_unavailable(&client, false);
        service.settle();
        assert!(unit.is_active());
        assert_eq!(
            hooks.calls(),
            vec!["register", "become_active", "resign_active", "become_active"]
        );
    }

    #[test]
    fn test_reconnect_without_interrupted_step_changes_nothing() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        unit.start().unwrap();
        service.set_unavailable(&client, true);
        service.set_unavailable(&client, false);
        service.settle();

        assert!(unit.is_active());
        assert_eq!(hooks.calls(), vec!["register", "become_active"]);
        assert_eq!(service.watch_count(&paths::running_node("orders")), 1);
    }

    #[test]
    fn test_release_without_peer_reacquires() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        unit.start().unwrap();
        let peer_took_over = unit.release().unwrap();
        assert!(!peer_took_over);
        assert!(unit.is_active());
    }

    #[test]
    fn test_release_requires_active() {
        let service = MemoryCoordination::new();
        let client = service.connect();
        let hooks = Arc::new(RecordingHooks::default());
        let unit = unit(&client, "10.0.0.1:11111", &hooks);

        let err = unit.release().unwrap_err();
        assert_eq!(err.kind, ElectionErrorKind::NotActive);
    }
}
