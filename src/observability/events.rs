//! Observable control-plane events
//!
//! Events are explicit and typed; each maps to one stable log code.

use std::fmt;

/// Observable events in the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Process lifecycle
    /// Server configuration loaded and resolved
    ConfigLoaded,
    /// A destination's config was replaced by a later definition
    ConfigReplaced,
    /// Process startup aborted (FATAL)
    StartupAborted,
    /// Front door accepting requests
    Serving,
    /// Front door stopped
    FrontDoorStopped,

    // Coordination
    /// Membership marker created
    MembershipRegistered,
    /// Membership marker re-created after a new session
    MembershipRestored,
    /// Membership marker removed
    MembershipReleased,
    /// Coordination session could not be established
    SessionError,
    /// Coordination service unreachable
    CoordinationUnavailable,

    // Election
    /// Unit entered the race for leadership
    ElectionRegistering,
    /// Another member holds leadership; waiting
    ElectionStandby,
    /// This member holds leadership
    ElectionActive,
    /// Leadership given up voluntarily
    ElectionReleased,
    /// Leadership node vanished underneath an active unit
    ElectionLost,
    /// Unit returned to idle
    ElectionStopped,
    /// A lifecycle hook failed
    ElectionHookFailed,
    /// A coordination callback left the unit mid-transition
    ElectionCallbackFailed,

    // Pipeline
    /// Pipeline started for a destination
    PipelineStarted,
    /// Pipeline stopped for a destination
    PipelineStopped,
    /// Pipeline failed to start
    PipelineStartFailed,

    // Lifecycle actions
    /// Start action completed
    ActionStart,
    /// Stop action completed
    ActionStop,
    /// Reload action completed
    ActionReload,
    /// Release action completed
    ActionRelease,
    /// A lifecycle action was abandoned
    ActionFailed,

    // Config monitors
    /// Monitor loop started
    MonitorStarted,
    /// Monitor loop stopped
    MonitorStopped,
    /// Reconciliation pass finished
    ReconcileTick,
    /// Reconciliation pass skipped (source unavailable)
    ReconcileSkipped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ConfigReplaced => "CONFIG_REPLACED",
            Event::StartupAborted => "STARTUP_ABORTED",
            Event::Serving => "FRONT_DOOR_SERVING",
            Event::FrontDoorStopped => "FRONT_DOOR_STOPPED",

            Event::MembershipRegistered => "MEMBERSHIP_REGISTERED",
            Event::MembershipRestored => "MEMBERSHIP_RESTORED",
            Event::MembershipReleased => "MEMBERSHIP_RELEASED",
            Event::SessionError => "COORDINATION_SESSION_ERROR",
            Event::CoordinationUnavailable => "COORDINATION_UNAVAILABLE",

            Event::ElectionRegistering => "ELECTION_REGISTERING",
            Event::ElectionStandby => "ELECTION_STANDBY",
            Event::ElectionActive => "ELECTION_ACTIVE",
            Event::ElectionReleased => "ELECTION_RELEASED",
            Event::ElectionLost => "ELECTION_LEADERSHIP_LOST",
            Event::ElectionStopped => "ELECTION_STOPPED",
            Event::ElectionHookFailed => "ELECTION_HOOK_FAILED",
            Event::ElectionCallbackFailed => "ELECTION_CALLBACK_FAILED",

            Event::PipelineStarted => "PIPELINE_STARTED",
            Event::PipelineStopped => "PIPELINE_STOPPED",
            Event::PipelineStartFailed => "PIPELINE_START_FAILED",

            Event::ActionStart => "ACTION_START_COMPLETE",
            Event::ActionStop => "ACTION_STOP_COMPLETE",
            Event::ActionReload => "ACTION_RELOAD_COMPLETE",
            Event::ActionRelease => "ACTION_RELEASE_COMPLETE",
            Event::ActionFailed => "ACTION_FAILED",

            Event::MonitorStarted => "MONITOR_STARTED",
            Event::MonitorStopped => "MONITOR_STOPPED",
            Event::ReconcileTick => "RECONCILE_TICK",
            Event::ReconcileSkipped => "RECONCILE_SKIPPED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::StartupAborted)
    }

    /// Returns true if this event reports a failure that is not fatal
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::SessionError
                | Event::CoordinationUnavailable
                | Event::ElectionHookFailed
                | Event::ElectionCallbackFailed
                | Event::PipelineStartFailed
                | Event::ActionFailed
                | Event::ReconcileSkipped
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_codes_are_screaming_case() {
        let events = [
            Event::ConfigLoaded,
            Event::MembershipRestored,
            Event::SessionError,
            Event::ElectionActive,
            Event::ElectionLost,
            Event::PipelineStartFailed,
            Event::ActionReload,
            Event::ReconcileTick,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_and_failure_classes() {
        assert!(Event::StartupAborted.is_fatal());
        assert!(!Event::PipelineStartFailed.is_fatal());
        assert!(Event::PipelineStartFailed.is_failure());
        assert!(Event::ElectionCallbackFailed.is_failure());
        assert_eq!(Event::ElectionCallbackFailed.as_str(), "ELECTION_CALLBACK_FAILED");
        assert!(!Event::ElectionActive.is_failure());
    }
}
