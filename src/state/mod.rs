//! Vehicle state detection
//!
//! Provides the debounced state machine over three states:
//! - Parked: stationary, engine off or stopped past the idle threshold
//! - Driving: moving, or stopped briefly with the engine running
//! - Garage: maintenance mode, by override or after a long PARKED stay
//!
//! The machine itself is synchronous; [`StateService`] owns it on a single
//! task so telemetry polls and override commands are serialized.

mod machine;
mod service;

pub use machine::{
    Diagnostics, PendingDiagnostics, PendingTransition, StateManager, StateSnapshot, VehicleState,
};
pub use service::{StateCommand, StateHandle, StateService};
