//! Error types
//!
//! None of these are process-level faults. Telemetry errors degrade to the
//! conservative default, override errors go back to the caller with the
//! state untouched, and config errors only occur at startup.

use thiserror::Error;

use crate::state::VehicleState;

/// Why telemetry could not be turned into a usable sample
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    /// No sample was delivered for this poll
    #[error("telemetry unavailable")]
    Unavailable,

    /// A field was negative, NaN or infinite
    #[error("invalid telemetry value for {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },
}

/// Rejection of a manual override request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverrideError {
    #[error("invalid state name {0:?}: must be PARKED, DRIVING or GARAGE")]
    InvalidStateName(String),

    /// Safety lock: the assistant cannot be moved out of DRIVING while moving
    #[error("cannot override to {requested} while driving at {speed_mph} mph")]
    Rejected {
        requested: VehicleState,
        speed_mph: f64,
    },

    #[error("manual override is disabled in configuration")]
    Disabled,
}

impl OverrideError {
    /// Stable machine-readable code used on the IPC surface
    pub fn code(&self) -> &'static str {
        match self {
            OverrideError::InvalidStateName(_) => "invalid_state_name",
            OverrideError::Rejected { .. } => "override_rejected",
            OverrideError::Disabled => "override_disabled",
        }
    }
}

/// Invalid configuration detected at load time
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("max_len must be at least 1")]
    ZeroMaxLen,

    #[error("invalid emoji range {0:?}")]
    InvalidCharRange(String),

    #[error("invalid environment variable {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("fallback phrase {phrase:?} does not satisfy the driving policy")]
    NonCompliantFallback { phrase: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of a request routed through the state service
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateServiceError {
    /// The owning task has stopped and its channel is closed
    #[error("state service is not running")]
    Closed,

    #[error(transparent)]
    Override(#[from] OverrideError),
}
