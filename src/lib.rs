//! drive-guard: safety gating for an in-vehicle conversational assistant
//!
//! Two pieces sit between the assistant's language model and the driver:
//! - [`state`]: turns telemetry polls and manual commands into a confirmed
//!   [`VehicleState`] (PARKED, DRIVING, GARAGE) with hysteresis and timers
//! - [`validator`]: judges and cleans each response against the policy of
//!   the active state before it is spoken
//!
//! Telemetry acquisition, prompting, speech and UI live elsewhere and talk
//! to the daemon over [`ipc`].

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ipc;
pub mod lifecycle;
pub mod state;
pub mod telemetry;
pub mod validator;

pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use config::{Config, StateConfig};
pub use error::{ConfigError, OverrideError, StateServiceError, TelemetryError};
pub use state::{Diagnostics, StateHandle, StateManager, StateService, VehicleState};
pub use telemetry::{TelemetryFrame, TelemetrySample};
pub use validator::{ResponseValidator, ValidationReason, ValidationResult, ValidatorPolicy};
