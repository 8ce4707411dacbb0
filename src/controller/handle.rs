//! Control handle
//!
//! A cloneable reference to a running controller for front doors and
//! tooling: read-only views plus the lifecycle actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::actions::DestinationActions;
use super::context::{ControlContext, DestinationStatus};
use crate::config::{InstanceConfig, InstanceMode};
use crate::monitor::MonitorView;

/// Shared access to the controller
#[derive(Clone)]
pub struct ControlHandle {
    context: Arc<ControlContext>,
    actions: Arc<DestinationActions>,
}

impl ControlHandle {
    pub(crate) fn new(context: Arc<ControlContext>, actions: Arc<DestinationActions>) -> Self {
        Self { context, actions }
    }

    /// Lifecycle actions
    pub fn actions(&self) -> &DestinationActions {
        &self.actions
    }

    /// Advertised address of this process
    pub fn address(&self) -> &str {
        self.context.identity().address()
    }

    pub fn is_stopped(&self) -> bool {
        self.context.is_stopped()
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

    pub fn destination_statuses(&self) -> Vec<DestinationStatus> {
        self.context.destination_statuses()
    }
}
