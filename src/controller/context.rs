//! Control context
//!
//! Everything the controller owns for the life of the process: resolved
//! instance configs, election units, config monitors, and the shared
//! coordination client and pipeline engine. Lifecycle actions reach the
//! maps only through the methods below.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::locks::KeyedLocks;
use crate::config::{
    is_valid_destination, ConfigError, InstanceConfig, InstanceMode, InstanceResolver,
    InstanceTable,
};
use crate::coordination::CoordinationClient;
use crate::election::{
    ClusterHooks, ElectionState, ElectionUnit, RunningData, ServerIdentity, UnitRegistry,
};
use crate::lifecycle::{ActionError, ActionResult};
use crate::monitor::{ConfigMonitor, MonitorView};
use crate::observability::{log_destination_event, Event, Logger};
use crate::pipeline::{MessageForwarder, PipelineEngine};

/// Status of one destination as seen from this process
#[derive(Debug, Clone, Serialize)]
pub struct DestinationStatus {
    pub destination: String,
    pub mode: Option<InstanceMode>,
    pub lazy: bool,
    /// Election state name
    pub state: &'static str,
    pub active: bool,
    pub running: bool,
    /// Current leadership holder, cluster-wide
    pub holder: Option<RunningData>,
}

/// Shared controller state
pub struct ControlContext {
    identity: ServerIdentity,
    resolver: InstanceResolver,
    configs: Arc<InstanceTable>,
    units: UnitRegistry,
    monitors: BTreeMap<InstanceMode, Arc<dyn ConfigMonitor>>,
    locks: KeyedLocks,
    client: Arc<dyn CoordinationClient>,
    engine: Arc<dyn PipelineEngine>,
    forwarder: Option<Arc<dyn MessageForwarder>>,
    release_grace: Duration,
    stopped: AtomicBool,
}

impl ControlContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        identity: ServerIdentity,
        resolver: InstanceResolver,
        configs: Arc<InstanceTable>,
        monitors: BTreeMap<InstanceMode, Arc<dyn ConfigMonitor>>,
        client: Arc<dyn CoordinationClient>,
        engine: Arc<dyn PipelineEngine>,
        forwarder: Option<Arc<dyn MessageForwarder>>,
        release_grace: Duration,
    ) -> Self {
        Self {
            identity,
            resolver,
            configs,
            units: UnitRegistry::new(),
            monitors,
            locks: KeyedLocks::new(),
            client,
            engine,
            forwarder,
            release_grace,
            stopped: AtomicBool::new(false),
        }
    }

    /// Identity advertised by this process
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn client(&self) -> &Arc<dyn CoordinationClient> {
        &self.client
    }

    pub fn engine(&self) -> &Arc<dyn PipelineEngine> {
        &self.engine
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    pub(crate) fn units(&self) -> &UnitRegistry {
        &self.units
    }

    pub(crate) fn configs(&self) -> &InstanceTable {
        &self.configs
    }

    /// Monitor responsible for destinations of `mode`
    pub fn monitor(&self, mode: InstanceMode) -> Option<&Arc<dyn ConfigMonitor>> {
        self.monitors.get(&mode)
    }

    pub(crate) fn monitors(&self) -> impl Iterator<Item = (&InstanceMode, &Arc<dyn ConfigMonitor>)> {
        self.monitors.iter()
    }

    // =========================================================================
    // MAP ACCESS
    // =========================================================================

    /// The loaded config of `destination`, resolving and storing it if absent.
    pub fn load_config(&self, destination: &str) -> ActionResult<InstanceConfig> {
        if let Some(config) = self.configs.get(destination) {
            return Ok(config);
        }
        if !is_valid_destination(destination) {
            return Err(ConfigError::invalid(format!(
                "invalid destination name: {:?}",
                destination
            ))
            .into());
        }

        let config = self.resolver.resolve(destination)?;
        self.configs.insert(destination, config.clone());
        log_destination_event(
            Event::ConfigLoaded,
            destination,
            &[("mode", config.mode.as_str())],
        );
        Ok(config)
    }

    /// The election unit of `destination`, created on first reference.
    pub fn unit(&self, destination: &str) -> Arc<ElectionUnit> {
        self.units.get_or_create(destination, || {
            let hooks = ClusterHooks::new(
                destination,
                &self.identity,
                self.client.clone(),
                self.engine.clone(),
                self.forwarder.clone(),
            );
            ElectionUnit::new(
                destination,
                self.identity.clone(),
                self.client.clone(),
                Arc::new(hooks),
                self.release_grace,
            )
        })
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================
    // Callers hold the destination's lock.

    /// Load the config and enter the race. A lazy destination only enters
    /// when `demanded`.
    pub(crate) fn start_destination(&self, destination: &str, demanded: bool) -> ActionResult<()> {
        self.ensure_running()?;
        let config = self.load_config(destination)?;
        if config.lazy && !demanded {
            Logger::info(
                "DESTINATION_LAZY_DEFERRED",
                &[("destination", destination)],
            );
            return Ok(());
        }
        if self.engine.is_running(destination) {
            return Ok(());
        }

        let unit = self.unit(destination);
        if !unit.is_started() {
            unit.start()?;
        }
        Ok(())
    }

    /// Drop the config, stop the pipeline and leave the race.
    pub(crate) fn stop_destination(&self, destination: &str) -> ActionResult<()> {
        self.configs.remove(destination);
        self.engine.stop(destination)?;
        if let Some(unit) = self.units.get(destination) {
            if unit.is_started() {
                unit.stop()?;
            }
        }
        Ok(())
    }

    /// Hand leadership to a peer. Without a peer the destination is stopped
    /// and purged from its monitor so the next tick starts it afresh.
    ///
    /// Returns whether a peer took over.
    pub(crate) fn release_destination(&self, destination: &str) -> ActionResult<bool> {
        self.ensure_running()?;
        let Some(unit) = self.units.get(destination).filter(|unit| unit.is_active()) else {
            Logger::info(
                "DESTINATION_RELEASE_SKIPPED",
                &[("destination", destination), ("reason", "not active")],
            );
            return Ok(false);
        };

        if unit.release()? {
            return Ok(true);
        }

        let mode = self.configs.remove(destination).map(|config| config.mode);
        unit.stop()?;
        if let Some(monitor) = mode.and_then(|mode| self.monitors.get(&mode)) {
            monitor.release(destination);
        }
        Logger::info(
            "DESTINATION_RELEASE_FALLBACK",
            &[("destination", destination), ("reason", "no peer available")],
        );
        Ok(false)
    }

    fn ensure_running(&self) -> ActionResult<()> {
        if self.is_stopped() {
            return Err(ActionError::ControllerStopped);
        }
        Ok(())
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// Loaded configs, by destination
    pub fn instance_configs(&self) -> BTreeMap<String, InstanceConfig> {
        self.configs.snapshot()
    }

    /// Monitor views, by mode
    pub fn monitor_views(&self) -> BTreeMap<InstanceMode, MonitorView> {
        self.monitors
            .iter()
            .map(|(mode, monitor)| (*mode, monitor.view()))
            .collect()
    }

    /// Status of one destination; `None` if it is neither loaded nor has a
    /// unit.
    pub fn destination_status(&self, destination: &str) -> Option<DestinationStatus> {
        let config = self.configs.get(destination);
        let unit = self.units.get(destination);
        if config.is_none() && unit.is_none() {
            return None;
        }

        let state = unit
            .as_ref()
            .map(|unit| unit.state().state_name())
            .unwrap_or_else(|| ElectionState::Idle.state_name());
        Some(DestinationStatus {
            destination: destination.to_string(),
            mode: config.as_ref().map(|config| config.mode),
            lazy: config.as_ref().is_some_and(|config| config.lazy),
            state,
            active: unit.as_ref().is_some_and(|unit| unit.is_active()),
            running: self.engine.is_running(destination),
            holder: unit.as_ref().and_then(|unit| unit.holder()),
        })
    }

    /// Status of every loaded destination or known unit, sorted
    pub fn destination_statuses(&self) -> Vec<DestinationStatus> {
        let mut names: Vec<String> = self.configs.snapshot().into_keys().collect();
        names.extend(
            self.units
                .all()
                .iter()
                .map(|unit| unit.destination().to_string()),
        );
        names.sort();
        names.dedup();
        names
            .iter()
            .filter_map(|destination| self.destination_status(destination))
            .collect()
    }
}
