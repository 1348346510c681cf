//! Events emitted by the state manager
//!
//! Broadcast to the IPC server for subscribed clients and logged by the
//! daemon. Nothing in the core depends on anyone listening.

use serde::{Deserialize, Serialize};

use crate::state::VehicleState;

/// What caused a confirmed state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// Raw telemetry condition held through the hysteresis window
    Telemetry,
    /// PARKED long enough to be promoted to GARAGE
    GarageTimeout,
    /// A manual override pinned the state
    ManualOverride,
    /// Clearing the override handed GARAGE back to automatic detection
    OverrideCleared,
    /// The manager was reset
    Reset,
}

impl std::fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionCause::Telemetry => write!(f, "telemetry"),
            TransitionCause::GarageTimeout => write!(f, "garage_timeout"),
            TransitionCause::ManualOverride => write!(f, "manual_override"),
            TransitionCause::OverrideCleared => write!(f, "override_cleared"),
            TransitionCause::Reset => write!(f, "reset"),
        }
    }
}

/// Events emitted by the state manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// The confirmed state changed
    StateChanged {
        from: VehicleState,
        to: VehicleState,
        cause: TransitionCause,
        /// How long the previous state was held, in milliseconds
        time_in_state_ms: u64,
    },

    /// A manual override was accepted
    OverrideSet { state: VehicleState },

    /// The manual override was cleared
    OverrideCleared { state: VehicleState },

    /// Telemetry stopped arriving; the conservative default is in effect
    TelemetryLost,

    /// Telemetry resumed after an outage
    TelemetryRestored {
        /// Length of the outage in milliseconds
        outage_ms: u64,
    },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::StateChanged {
                from,
                to,
                cause,
                time_in_state_ms,
            } => write!(
                f,
                "STATE_CHANGED {} -> {} ({}, {}ms)",
                from, to, cause, time_in_state_ms
            ),
            StateEvent::OverrideSet { state } => write!(f, "OVERRIDE_SET ({})", state),
            StateEvent::OverrideCleared { state } => write!(f, "OVERRIDE_CLEARED ({})", state),
            StateEvent::TelemetryLost => write!(f, "TELEMETRY_LOST"),
            StateEvent::TelemetryRestored { outage_ms } => {
                write!(f, "TELEMETRY_RESTORED ({}ms)", outage_ms)
            }
        }
    }
}
