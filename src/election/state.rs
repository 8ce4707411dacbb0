//! Election State Machine
//!
//! - States are explicit and enumerable
//! - Transitions are explicit methods; anything else is forbidden
//! - `Idle` is the only resting state; a stopped unit may start again
//!
//! ```text
//! Idle ──begin_registration──▶ Registering ──become_active──▶ Active
//!  ▲                              ▲                             │
//!  │                              └──────────resign─────────────┤
//!  └───────────────────stop (from Registering or Active)────────┘
//! ```

use super::errors::{ElectionError, ElectionResult};

/// Leadership state of one destination in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElectionState {
    /// Not participating
    #[default]
    Idle,

    /// Member of the destination's cluster, competing or waiting for
    /// leadership
    Registering,

    /// Holds the destination's leadership node; the pipeline runs here
    Active,
}

impl ElectionState {
    /// Get the state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Registering => "Registering",
            Self::Active => "Active",
        }
    }

    /// Whether the unit has been started (not `Idle`).
    pub fn is_started(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Whether the unit holds leadership.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    // =========================================================================
    // ALLOWED TRANSITIONS
    // =========================================================================

    /// Idle → Registering
    pub fn begin_registration(self) -> ElectionResult<Self> {
        match self {
            Self::Idle => Ok(Self::Registering),
            _ => Err(ElectionError::forbidden_transition(
                self.state_name(),
                "Registering",
            )),
        }
    }

    /// Registering → Active
    pub fn become_active(self) -> ElectionResult<Self> {
        match self {
            Self::Registering => Ok(Self::Active),
            _ => Err(ElectionError::forbidden_transition(
                self.state_name(),
                "Active",
            )),
        }
    }

    /// Active → Registering
    ///
    /// Leadership released or lost; the unit stays a cluster member.
    pub fn resign(self) -> ElectionResult<Self> {
        match self {
            Self::Active => Ok(Self::Registering),
            _ => Err(ElectionError::forbidden_transition(
                self.state_name(),
                "Registering",
            )),
        }
    }

    /// Registering | Active → Idle
    pub fn stop(self) -> ElectionResult<Self> {
        match self {
            Self::Registering | Self::Active => Ok(Self::Idle),
            Self::Idle => Err(ElectionError::forbidden_transition("Idle", "Idle")),
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Registering => 1,
            Self::Active => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Registering,
            2 => Self::Active,
            _ => Self::Idle,
        }
    }
}
