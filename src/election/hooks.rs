//! Lifecycle hooks
//!
//! Four callbacks bound to one destination when its election unit is built,
//! invoked in the fixed order register → become-active → resign-active →
//! deregister (become/resign may repeat while the unit stays registered).

use std::sync::Arc;

use super::errors::HookResult;
use super::identity::ServerIdentity;
use crate::coordination::{paths, CoordinationClient, MembershipMarker};
use crate::pipeline::{MessageForwarder, PipelineEngine};

/// Callbacks an election unit drives
pub trait LifecycleHooks: Send + Sync {
    /// Join the destination's cluster; must be idempotent.
    fn on_register(&self) -> HookResult<()>;

    /// Leadership acquired: run the pipeline.
    fn on_become_active(&self) -> HookResult<()>;

    /// Leadership about to be given up: stop the pipeline.
    fn on_resign_active(&self) -> HookResult<()>;

    /// Leave the destination's cluster.
    fn on_deregister(&self) -> HookResult<()>;
}

/// Production hooks: membership marker plus pipeline engine and forwarder
pub struct ClusterHooks {
    destination: String,
    marker: Arc<MembershipMarker>,
    engine: Arc<dyn PipelineEngine>,
    forwarder: Option<Arc<dyn MessageForwarder>>,
}

impl ClusterHooks {
    /// Bind hooks to one destination.
    pub fn new(
        destination: &str,
        identity: &ServerIdentity,
        client: Arc<dyn CoordinationClient>,
        engine: Arc<dyn PipelineEngine>,
        forwarder: Option<Arc<dyn MessageForwarder>>,
    ) -> Self {
        let marker = MembershipMarker::new(
            client,
            paths::destination_cluster_node(destination, identity.address()),
            Vec::new(),
        );
        Self {
            destination: destination.to_string(),
            marker,
            engine,
            forwarder,
        }
    }

    /// Membership marker of this destination
    pub fn marker(&self) -> &Arc<MembershipMarker> {
        &self.marker
    }
}

impl LifecycleHooks for ClusterHooks {
    fn on_register(&self) -> HookResult<()> {
        self.marker.register()?;
        Ok(())
    }

    fn on_become_active(&self) -> HookResult<()> {
        self.engine.start(&self.destination)?;
        if let Some(forwarder) = &self.forwarder {
            forwarder.start_destination(&self.destination)?;
        }
        Ok(())
    }

    fn on_resign_active(&self) -> HookResult<()> {
        if let Some(forwarder) = &self.forwarder {
            forwarder.stop_destination(&self.destination)?;
        }
        self.engine.stop(&self.destination)?;
        Ok(())
    }

    fn on_deregister(&self) -> HookResult<()> {
        self.marker.deregister()?;
        Ok(())
    }
}
