//! Periodic reconciliation monitor
//!
//! `ScanMonitor` runs one reconciliation tick per interval on the given
//! tokio runtime. Each tick runs on the blocking pool; ticks never overlap
//! and an overrunning tick delays the next one.
//!
//! Per tick:
//! 1. query the source for desired destinations and their fingerprints
//! 2. diff against the previous observation and fire start/stop/reload
//! 3. merge the observation, even if single actions failed
//!
//! A failed source query skips the tick entirely. Destinations registered,
//! unregistered or released while a tick runs keep their live state; the
//! tick's view of them is dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::errors::{MonitorError, MonitorResult};
use super::reconcile::{Fingerprint, Observation, ReconcilePlan};
use super::source::ConfigSource;
use crate::config::InstanceMode;
use crate::lifecycle::LifecycleActions;
use crate::observability::{log_destination_event, log_event_with_fields, Event, Logger};

/// Read-only view of a monitor for status tooling
#[derive(Debug, Clone, Serialize)]
pub struct MonitorView {
    pub mode: InstanceMode,
    pub source: &'static str,
    pub running: bool,
    pub interval_ms: u64,
    pub known: BTreeMap<String, Option<Fingerprint>>,
    pub registered: Vec<String>,
}

/// Outcome of one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub plan: ReconcilePlan,
    /// Destinations whose action failed, with the reason
    pub failed: Vec<(String, String)>,
}

/// Keeps a set of destinations in sync with a configuration source
pub trait ConfigMonitor: Send + Sync {
    /// Mode of the destinations this monitor is responsible for
    fn mode(&self) -> InstanceMode;

    /// Track a destination and the actions to fire for it.
    fn register(&self, destination: &str, actions: Arc<dyn LifecycleActions>);

    /// Stop tracking a destination.
    fn unregister(&self, destination: &str);

    /// Forget a destination entirely so the next tick treats it as new.
    fn release(&self, destination: &str);

    /// Actions bound to destinations discovered by a tick
    fn set_default_actions(&self, actions: Arc<dyn LifecycleActions>);

    /// Registered destinations, sorted
    fn registered(&self) -> Vec<String>;

    /// Start the periodic loop. Starting a running monitor is a no-op.
    fn start(&self) -> MonitorResult<()>;

    /// Stop the loop and wait for an in-flight tick to finish.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Run one reconciliation pass now.
    fn tick(&self) -> MonitorResult<TickReport>;

    fn view(&self) -> MonitorView;
}

#[derive(Default)]
struct MonitorState {
    known: Observation,
    actions: HashMap<String, Arc<dyn LifecycleActions>>,
    defaults: Option<Arc<dyn LifecycleActions>>,
    /// Changed outside the current tick since its snapshot
    touched: BTreeSet<String>,
}

impl MonitorState {
    fn touch(&mut self, destination: &str) {
        self.touched.insert(destination.to_string());
    }

    /// Fold a finished tick into the live state.
    fn merge(
        &mut self,
        current: Observation,
        plan: &ReconcilePlan,
        actions_for: impl Fn(&str) -> Option<Arc<dyn LifecycleActions>>,
    ) {
        let touched = std::mem::take(&mut self.touched);
        let untouched = |d: &String| !touched.contains(d);

        for destination in plan.stop.iter().filter(|d| untouched(*d)) {
            self.known.remove(destination);
            self.actions.remove(destination);
        }
        for (destination, fingerprint) in current.into_iter().filter(|(d, _)| untouched(d)) {
            self.known.insert(destination, fingerprint);
        }
        for destination in plan.start.iter().filter(|d| untouched(*d)) {
            if let Some(actions) = actions_for(destination.as_str()) {
                self.actions.entry(destination.clone()).or_insert(actions);
            }
        }
    }
}

/// Interval-driven monitor over a `ConfigSource`
pub struct ScanMonitor<S: ConfigSource> {
    mode: InstanceMode,
    source: S,
    interval: Duration,
    runtime: Handle,
    state: Mutex<MonitorState>,
    /// Serializes ticks
    tick_lock: Mutex<()>,
    /// Shutdown signal of the running loop
    task: Mutex<Option<watch::Sender<bool>>>,
    this: Weak<Self>,
}

impl<S: ConfigSource + 'static> ScanMonitor<S> {
    /// Create a stopped monitor whose loop will run on `runtime`.
    pub fn new(mode: InstanceMode, source: S, interval: Duration, runtime: Handle) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            mode,
            source,
            interval,
            runtime,
            state: Mutex::new(MonitorState::default()),
            tick_lock: Mutex::new(()),
            task: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// The configuration source
    pub fn source(&self) -> &S {
        &self.source
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scheduled_tick(&self) {
        let _tick = self.tick_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_running() {
            // Failures are logged inside
            let _ = self.reconcile();
        }
    }

    fn observe(&self, previous: &Observation) -> MonitorResult<Observation> {
        let desired = self.source.destinations()?;

        let mut current = Observation::new();
        for destination in desired {
            match self.source.fingerprint(&destination) {
                Ok(fingerprint) => {
                    current.insert(destination, Some(fingerprint));
                }
                Err(e) => {
                    let reason = e.to_string();
                    log_destination_event(
                        Event::ReconcileSkipped,
                        &destination,
                        &[("reason", &reason)],
                    );
                    // Keep the old fingerprint; an unseen destination waits
                    if let Some(old) = previous.get(&destination) {
                        current.insert(destination, old.clone());
                    }
                }
            }
        }
        Ok(current)
    }

    /// One pass; the caller holds `tick_lock`.
    fn reconcile(&self) -> MonitorResult<TickReport> {
        let (previous, bound, defaults) = {
            let mut state = self.state();
            state.touched.clear();
            (state.known.clone(), state.actions.clone(), state.defaults.clone())
        };

        let current = match self.observe(&previous) {
            Ok(current) => current,
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::ReconcileSkipped,
                    &[
                        ("mode", self.mode.as_str()),
                        ("source", self.source.kind()),
                        ("reason", &reason),
                    ],
                );
                return Err(e);
            }
        };

        let plan = ReconcilePlan::diff(&previous, &current);
        let mut report = TickReport::default();
        let actions_for = |destination: &str| bound.get(destination).cloned().or_else(|| defaults.clone());

        let steps = plan
            .start
            .iter()
            .map(|d| ("start", d))
            .chain(plan.stop.iter().map(|d| ("stop", d)))
            .chain(plan.reload.iter().map(|d| ("reload", d)));
        for (kind, destination) in steps {
            let Some(actions) = actions_for(destination) else {
                report
                    .failed
                    .push((destination.clone(), "no actions bound".to_string()));
                continue;
            };
            let result = match kind {
                "start" => actions.start(destination),
                "stop" => actions.stop(destination),
                _ => actions.reload(destination),
            };
            if let Err(e) = result {
                report.failed.push((destination.clone(), e.to_string()));
            }
        }

        self.state().merge(current, &plan, actions_for);

        let (started, stopped, reloaded, failed) = (
            plan.start.len().to_string(),
            plan.stop.len().to_string(),
            plan.reload.len().to_string(),
            report.failed.len().to_string(),
        );
        let fields = [
            ("mode", self.mode.as_str()),
            ("started", started.as_str()),
            ("stopped", stopped.as_str()),
            ("reloaded", reloaded.as_str()),
            ("failed", failed.as_str()),
        ];
        if plan.is_empty() {
            Logger::trace(Event::ReconcileTick.as_str(), &fields);
        } else {
            log_event_with_fields(Event::ReconcileTick, &fields);
        }

        report.plan = plan;
        Ok(report)
    }
}

impl<S: ConfigSource + 'static> ConfigMonitor for ScanMonitor<S> {
    fn mode(&self) -> InstanceMode {
        self.mode
    }

    fn register(&self, destination: &str, actions: Arc<dyn LifecycleActions>) {
        let mut state = self.state();
        state.actions.insert(destination.to_string(), actions);
        state.known.entry(destination.to_string()).or_insert(None);
        state.touch(destination);
    }

    fn unregister(&self, destination: &str) {
        let mut state = self.state();
        state.actions.remove(destination);
        state.known.remove(destination);
        state.touch(destination);
    }

    fn release(&self, destination: &str) {
        self.unregister(destination);
        Logger::info(
            "MONITOR_DESTINATION_PURGED",
            &[("destination", destination), ("mode", self.mode.as_str())],
        );
    }

    fn set_default_actions(&self, actions: Arc<dyn LifecycleActions>) {
        self.state().defaults = Some(actions);
    }

    fn registered(&self) -> Vec<String> {
        let mut registered: Vec<String> = self.state().actions.keys().cloned().collect();
        registered.sort();
        registered
    }

    fn start(&self) -> MonitorResult<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Ok(());
        }
        if self.this.upgrade().is_none() {
            return Err(MonitorError::Dropped);
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let monitor = self.this.clone();
        let interval = self.interval;

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let monitor = monitor.clone();
                        let finished = tokio::task::spawn_blocking(move || {
                            if let Some(monitor) = monitor.upgrade() {
                                monitor.scheduled_tick();
                                true
                            } else {
                                false
                            }
                        })
                        .await;
                        if !matches!(finished, Ok(true)) {
                            break;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *task = Some(shutdown);
        let interval_ms = self.interval.as_millis().to_string();
        log_event_with_fields(
            Event::MonitorStarted,
            &[
                ("mode", self.mode.as_str()),
                ("source", self.source.kind()),
                ("interval_ms", &interval_ms),
            ],
        );
        Ok(())
    }

    fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(shutdown) = task else {
            return;
        };
        let _ = shutdown.send(true);

        // Wait out a tick that is already running
        drop(self.tick_lock.lock().unwrap_or_else(PoisonError::into_inner));
        log_event_with_fields(Event::MonitorStopped, &[("mode", self.mode.as_str())]);
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn tick(&self) -> MonitorResult<TickReport> {
        let _tick = self.tick_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.reconcile()
    }

    fn view(&self) -> MonitorView {
        let state = self.state();
        let mut registered: Vec<String> = state.actions.keys().cloned().collect();
        registered.sort();
        MonitorView {
            mode: self.mode,
            source: self.source.kind(),
            running: self.is_running(),
            interval_ms: u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            known: state.known.clone(),
            registered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ActionResult;
    use crate::monitor::source::FileScanSource;
    use crate::pipeline::PipelineError;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingActions {
        calls: Mutex<Vec<String>>,
        fail_on: Mutex<Option<String>>,
        /// Runs inside `start`, while the tick is in flight
        during_start: Mutex<Option<Box<dyn Fn(&str) + Send>>>,
    }

    impl RecordingActions {
        fn record(&self, action: &str, destination: &str) -> ActionResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", action, destination));
            if self.fail_on.lock().unwrap().as_deref() == Some(destination) {
                return Err(PipelineError::UnknownDestination(destination.to_string()).into());
            }
            Ok(())
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl LifecycleActions for RecordingActions {
        fn start(&self, destination: &str) -> ActionResult<()> {
            let result = self.record("start", destination);
            if let Some(hook) = self.during_start.lock().unwrap().as_ref() {
                hook(destination);
            }
            result
        }
        fn stop(&self, destination: &str) -> ActionResult<()> {
            self.record("stop", destination)
        }
        fn reload(&self, destination: &str) -> ActionResult<()> {
            self.record("reload", destination)
        }
        fn release(&self, destination: &str) -> ActionResult<()> {
            self.record("release", destination)
        }
    }

    fn monitor(
        dir: &TempDir,
        runtime: &tokio::runtime::Runtime,
        interval: Duration,
    ) -> (Arc<ScanMonitor<FileScanSource>>, Arc<RecordingActions>) {
        let monitor = ScanMonitor::new(
            InstanceMode::Local,
            FileScanSource::new(dir.path()),
            interval,
            runtime.handle().clone(),
        );
        let actions = Arc::new(RecordingActions::default());
        monitor.set_default_actions(actions.clone());
        (monitor, actions)
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_registered_destination_is_not_restarted() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (monitor, actions) = monitor(&dir, &rt, Duration::from_secs(60));
        fs::write(dir.path().join("orders.json"), "{}").unwrap();

        monitor.register("orders", actions.clone());
        let report = monitor.tick().unwrap();
        assert!(report.plan.is_empty());
        assert!(actions.take().is_empty());
    }

    #[test]
    fn test_failed_action_does_not_abort_tick() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (monitor, actions) = monitor(&dir, &rt, Duration::from_secs(60));
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        *actions.fail_on.lock().unwrap() = Some("a".to_string());

        let report = monitor.tick().unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(actions.take(), vec!["start:a", "start:b"]);

        // Both are known now; nothing fires again
        monitor.tick().unwrap();
        assert!(actions.take().is_empty());
        assert_eq!(monitor.registered(), vec!["a", "b"]);
    }

    #[test]
    fn test_source_failure_skips_tick() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (monitor, actions) = monitor(&dir, &rt, Duration::from_secs(60));
        fs::write(dir.path().join("orders.json"), "{}").unwrap();
        monitor.tick().unwrap();
        actions.take();

        let conf_dir = dir.path().to_path_buf();
        drop(dir);
        assert!(!conf_dir.exists());

        assert!(monitor.tick().is_err());
        assert!(actions.take().is_empty());
        assert_eq!(monitor.registered(), vec!["orders"]);
    }

    #[test]
    fn test_release_purges_destination() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (monitor, actions) = monitor(&dir, &rt, Duration::from_secs(60));
        fs::write(dir.path().join("orders.json"), "{}").unwrap();
        monitor.tick().unwrap();
        actions.take();

        monitor.release("orders");
        assert!(monitor.registered().is_empty());

        monitor.tick().unwrap();
        assert_eq!(actions.take(), vec!["start:orders"]);
    }

    #[test]
    fn test_release_during_tick_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (monitor, actions) = monitor(&dir, &rt, Duration::from_secs(60));
        fs::write(dir.path().join("orders.json"), "{}").unwrap();
        monitor.tick().unwrap();
        actions.take();

        let weak = Arc::downgrade(&monitor);
        *actions.during_start.lock().unwrap() = Some(Box::new(move |destination: &str| {
            if destination == "users" {
                if let Some(monitor) = weak.upgrade() {
                    monitor.release("orders");
                }
            }
        }));
        fs::write(dir.path().join("users.json"), "{}").unwrap();

        monitor.tick().unwrap();
        assert_eq!(actions.take(), vec!["start:users"]);
        assert!(!monitor.view().known.contains_key("orders"));
        assert_eq!(monitor.registered(), vec!["users"]);

        monitor.tick().unwrap();
        assert_eq!(actions.take(), vec!["start:orders"]);
        assert_eq!(monitor.registered(), vec!["orders", "users"]);
    }

    #[test]
    fn test_register_during_tick_keeps_its_actions() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (monitor, actions) = monitor(&dir, &rt, Duration::from_secs(60));
        let dedicated = Arc::new(RecordingActions::default());

        let weak = Arc::downgrade(&monitor);
        let bound = dedicated.clone();
        *actions.during_start.lock().unwrap() = Some(Box::new(move |destination: &str| {
            if destination == "users" {
                if let Some(monitor) = weak.upgrade() {
                    monitor.register("orders", bound.clone());
                }
            }
        }));
        fs::write(dir.path().join("users.json"), "{}").unwrap();
        monitor.tick().unwrap();
        assert_eq!(monitor.view().known.get("orders"), Some(&None));

        // Registered mid-tick and now on disk: adopted without a start
        fs::write(dir.path().join("orders.json"), "{}").unwrap();
        let report = monitor.tick().unwrap();
        assert!(report.plan.is_empty());
        assert!(dedicated.take().is_empty());
        assert_eq!(monitor.registered(), vec!["orders", "users"]);
    }

    #[test]
    fn test_view_reports_interval() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (regular, _) = monitor(&dir, &rt, Duration::from_millis(1500));
        assert_eq!(regular.view().interval_ms, 1500);

        let (slow, _) = monitor(&dir, &rt, Duration::MAX);
        assert_eq!(slow.view().interval_ms, u64::MAX);
    }

    #[test]
    fn test_loop_runs_on_interval_until_stopped() {
        let dir = TempDir::new().unwrap();
        let rt = runtime();
        let (monitor, actions) = monitor(&dir, &rt, Duration::from_millis(50));

        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());

        fs::write(dir.path().join("orders.json"), "{}").unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while actions.calls.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(actions.take(), vec!["start:orders"]);

        monitor.stop();
        assert!(!monitor.is_running());
        fs::write(dir.path().join("users.json"), "{}").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(actions.take().is_empty());
        assert!(!monitor.view().running);
    }
}
