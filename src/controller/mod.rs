//! Controller
//!
//! Process-wide orchestrator. The controller:
//! - resolves the boot destinations' instance configs
//! - owns one election unit per destination and the config monitors
//! - advertises process membership to the coordination service
//! - drives startup and shutdown, front door last in and first out
//!
//! Startup failures abort the process; shutdown is best effort and never
//! stops early because one resource failed.

mod actions;
mod context;
mod errors;
mod front_door;
mod handle;
mod locks;

pub use actions::DestinationActions;
pub use context::{ControlContext, DestinationStatus};
pub use errors::{ControllerError, ControllerResult};
pub use front_door::FrontDoor;
pub use handle::ControlHandle;
pub use locks::KeyedLocks;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::{InstanceConfig, InstanceMode, InstanceTable, ServerConfig};
use crate::coordination::{paths, CoordinationClient, MembershipMarker};
use crate::election::{ElectionUnit, ServerIdentity};
use crate::lifecycle::LifecycleActions;
use crate::manager::ClientPool;
use crate::monitor::{ConfigMonitor, FileScanSource, MonitorView, RemotePollSource, ScanMonitor};
use crate::observability::{log_event_with_fields, Event, Logger, ObservationScope};
use crate::pipeline::{MessageForwarder, PipelineEngine};

/// Shared resources the controller is built from
pub struct ControllerParts {
    pub client: Arc<dyn CoordinationClient>,
    pub engine: Arc<dyn PipelineEngine>,
    pub forwarder: Option<Arc<dyn MessageForwarder>>,
    /// Instance config table, shared read-only with the definition generator
    pub configs: Arc<InstanceTable>,
    /// Remote manager clients, one per address
    pub clients: Arc<ClientPool>,
    /// Runtime the monitor loops run on
    pub runtime: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Stopped,
}

/// The process-wide control plane
pub struct Controller {
    context: Arc<ControlContext>,
    actions: Arc<DestinationActions>,
    membership: Arc<MembershipMarker>,
    /// Boot destinations, in configuration order
    boot: Vec<String>,
    global_mode: InstanceMode,
    front_door: Option<Box<dyn FrontDoor>>,
    phase: Phase,
}

impl Controller {
    /// Resolve the boot configuration and build every component.
    ///
    /// Creates the persistent coordination roots. Nothing runs until
    /// `start`.
    pub fn new(config: &ServerConfig, parts: ControllerParts) -> ControllerResult<Self> {
        let identity = ServerIdentity::new(config.advertised_address());
        let resolver = config.resolver()?;

        parts
            .client
            .create_persistent(paths::DESTINATION_ROOT, true)?;
        parts.client.create_persistent(paths::CLUSTER_ROOT, true)?;

        let mut boot = Vec::new();
        let mut modes_in_use = BTreeSet::from([resolver.global().mode]);
        for destination in &config.destinations {
            let resolved = resolver.resolve(destination)?;
            let mode = resolved.mode;
            modes_in_use.insert(mode);
            if parts.configs.insert(destination, resolved).is_some() {
                Logger::warn(
                    Event::ConfigReplaced.as_str(),
                    &[("destination", destination)],
                );
            } else {
                boot.push(destination.clone());
            }
            log_event_with_fields(
                Event::ConfigLoaded,
                &[("destination", destination), ("mode", mode.as_str())],
            );
        }

        // One monitor per mode in use
        let mut monitors: BTreeMap<InstanceMode, Arc<dyn ConfigMonitor>> = BTreeMap::new();
        if config.auto_scan {
            if modes_in_use.contains(&InstanceMode::Local) {
                let local = ScanMonitor::new(
                    InstanceMode::Local,
                    FileScanSource::new(&config.conf_dir),
                    config.scan_interval(),
                    parts.runtime.clone(),
                );
                monitors.insert(InstanceMode::Local, local);
            }

            if let Some(address) = &resolver.global().manager_address {
                let manager = ScanMonitor::new(
                    InstanceMode::Manager,
                    RemotePollSource::new(parts.clients.clone(), address.clone()),
                    config.scan_interval(),
                    parts.runtime.clone(),
                );
                monitors.insert(InstanceMode::Manager, manager);
            }
        }

        let global_mode = resolver.global().mode;
        let membership = MembershipMarker::new(
            parts.client.clone(),
            paths::process_cluster_node(identity.address()),
            identity.running_data().to_bytes(),
        );
        let context = Arc::new(ControlContext::new(
            identity,
            resolver,
            parts.configs,
            monitors,
            parts.client,
            parts.engine,
            parts.forwarder,
            config.release_grace(),
        ));

        let actions = Arc::new(DestinationActions::new(&context));
        for (_, monitor) in context.monitors() {
            monitor.set_default_actions(actions.clone());
        }

        Ok(Self {
            context,
            actions,
            membership,
            boot,
            global_mode,
            front_door: None,
            phase: Phase::Created,
        })
    }

    /// Install the front door opened at the end of `start`.
    pub fn set_front_door(&mut self, front_door: Box<dyn FrontDoor>) {
        self.front_door = Some(front_door);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Bring the control plane up.
    ///
    /// Order: process membership, pipeline engine, boot destinations,
    /// monitors (global mode first), front door. A failing destination is
    /// logged and skipped; any other failure stops what was started and
    /// aborts.
    pub fn start(&mut self) -> ControllerResult<()> {
        match self.phase {
            Phase::Created => {}
            Phase::Running => return Err(ControllerError::AlreadyStarted),
            Phase::Stopped => return Err(ControllerError::Stopped),
        }

        let address = self.context.identity().address().to_string();
        let scope = ObservationScope::with_fields("CONTROLLER_START", &[("address", &address)]);
        match self.bring_up() {
            Ok(()) => {
                self.phase = Phase::Running;
                scope.complete();
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                scope.fail(&reason);
                log_event_with_fields(Event::StartupAborted, &[("reason", &reason)]);
                self.tear_down();
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> ControllerResult<()> {
        self.membership.register()?;
        self.context.engine().start_engine()?;

        for destination in &self.boot {
            // Logged by the action; the destination stays down
            let _ = self.actions.start(destination);
        }

        let actions: Arc<dyn LifecycleActions> = self.actions.clone();
        for destination in &self.boot {
            let mode = self.context.configs().get(destination).map(|c| c.mode);
            if let Some(monitor) = mode.and_then(|mode| self.context.monitor(mode)) {
                monitor.register(destination, actions.clone());
            }
        }

        if let Some(monitor) = self.context.monitor(self.global_mode) {
            monitor.start()?;
        }
        for (mode, monitor) in self.context.monitors() {
            if *mode != self.global_mode {
                monitor.start()?;
            }
        }

        let handle = self.handle();
        if let Some(front_door) = self.front_door.as_mut() {
            front_door.open(handle)?;
        }
        Ok(())
    }

    /// Shut everything down. Idempotent.
    pub fn stop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        let address = self.context.identity().address().to_string();
        let scope = ObservationScope::with_fields("CONTROLLER_STOP", &[("address", &address)]);
        self.tear_down();
        scope.complete();
    }

    fn tear_down(&mut self) {
        if let Some(front_door) = self.front_door.as_mut() {
            front_door.close();
        }
        for (_, monitor) in self.context.monitors() {
            monitor.stop();
        }
        self.context.mark_stopped();

        for unit in self.context.units().all() {
            let destination = unit.destination().to_string();
            let result = self.context.locks().with(&destination, || unit.stop());
            if let Err(e) = result {
                let reason = e.to_string();
                Logger::error(
                    "CONTROLLER_STOP_STEP_FAILED",
                    &[("destination", &destination), ("reason", &reason)],
                );
            }
        }

        if let Err(e) = self.context.engine().stop_engine() {
            let reason = e.to_string();
            Logger::error("CONTROLLER_STOP_STEP_FAILED", &[("step", "engine"), ("reason", &reason)]);
        }
        if let Err(e) = self.membership.deregister() {
            let reason = e.to_string();
            Logger::error(
                "CONTROLLER_STOP_STEP_FAILED",
                &[("step", "membership"), ("reason", &reason)],
            );
        }
        self.context.client().close();

        for (_, monitor) in self.context.monitors() {
            for destination in monitor.registered() {
                monitor.unregister(&destination);
            }
        }
        self.context.configs().clear();
        self.context.units().clear();
        self.phase = Phase::Stopped;
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn identity(&self) -> &ServerIdentity {
        self.context.identity()
    }

    /// Lifecycle actions bound to this controller
    pub fn actions(&self) -> Arc<DestinationActions> {
        self.actions.clone()
    }

    /// Cloneable handle for front doors and tooling
    pub fn handle(&self) -> ControlHandle {
        ControlHandle::new(self.context.clone(), self.actions.clone())
    }

    /// Election unit of `destination`, if one was built
    pub fn unit(&self, destination: &str) -> Option<Arc<ElectionUnit>> {
        self.context.units().get(destination)
    }

    pub fn monitor(&self, mode: InstanceMode) -> Option<Arc<dyn ConfigMonitor>> {
        self.context.monitor(mode).cloned()
    }

    pub fn instance_configs(&self) -> BTreeMap<String, InstanceConfig> {
        self.context.instance_configs()
    }

    pub fn monitor_views(&self) -> BTreeMap<InstanceMode, MonitorView> {
        self.context.monitor_views()
    }

    pub fn destination_status(&self, destination: &str) -> Option<DestinationStatus> {
        self.context.destination_status(destination)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.phase == Phase::Running {
            self.stop();
        }
    }
}
