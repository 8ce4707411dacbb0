//! Destination lifecycle actions
//!
//! The `LifecycleActions` the controller hands to its config monitors and
//! front door. Each action runs under the destination's lock, logs its
//! outcome, and reports failures to the caller without touching any other
//! destination.

use std::sync::{Arc, Weak};

use super::context::ControlContext;
use crate::lifecycle::{ActionError, ActionResult, LifecycleActions};
use crate::observability::{log_destination_event, Event};

/// Lifecycle actions backed by the controller's context
pub struct DestinationActions {
    context: Weak<ControlContext>,
}

impl DestinationActions {
    pub(crate) fn new(context: &Arc<ControlContext>) -> Self {
        Self {
            context: Arc::downgrade(context),
        }
    }

    /// Enter the race on external demand, lazy destinations included.
    pub fn demand(&self, destination: &str) -> ActionResult<()> {
        self.run("demand", Event::ActionStart, destination, |context| {
            context.start_destination(destination, true)
        })
    }

    /// Release leadership; `Ok(true)` when a peer took over.
    pub fn release_to_peer(&self, destination: &str) -> ActionResult<bool> {
        self.run("release", Event::ActionRelease, destination, |context| {
            context.release_destination(destination)
        })
    }

    fn run<T>(
        &self,
        action: &str,
        completed: Event,
        destination: &str,
        f: impl FnOnce(&ControlContext) -> ActionResult<T>,
    ) -> ActionResult<T> {
        let result = match self.context.upgrade() {
            Some(context) => context.locks().with(destination, || f(context.as_ref())),
            None => Err(ActionError::ControllerStopped),
        };

        match &result {
            Ok(_) => log_destination_event(completed, destination, &[]),
            Err(e) => {
                let reason = e.to_string();
                log_destination_event(
                    Event::ActionFailed,
                    destination,
                    &[("action", action), ("reason", &reason)],
                );
            }
        }
        result
    }
}

impl LifecycleActions for DestinationActions {
    fn start(&self, destination: &str) -> ActionResult<()> {
        self.run("start", Event::ActionStart, destination, |context| {
            context.start_destination(destination, false)
        })
    }

    fn stop(&self, destination: &str) -> ActionResult<()> {
        self.run("stop", Event::ActionStop, destination, |context| {
            context.stop_destination(destination)
        })
    }

    fn reload(&self, destination: &str) -> ActionResult<()> {
        self.run("reload", Event::ActionReload, destination, |context| {
            context.stop_destination(destination)?;
            context.start_destination(destination, false)
        })
    }

    fn release(&self, destination: &str) -> ActionResult<()> {
        self.release_to_peer(destination).map(|_| ())
    }
}
