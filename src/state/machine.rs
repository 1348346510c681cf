//! Core vehicle state machine
//!
//! Classifies each telemetry poll into PARKED, DRIVING or GARAGE. Raw
//! conditions only become the confirmed state after holding through the
//! hysteresis window, PARKED is promoted to GARAGE after a long stay, and a
//! manual override pins the state outright.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::Timestamp;
use crate::config::StateConfig;
use crate::error::OverrideError;
use crate::events::{StateEvent, TransitionCause};
use crate::telemetry::TelemetrySample;

/// Operational state of the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleState {
    /// Stationary with the engine off, or stopped for longer than a red light
    Parked,
    /// Moving, or briefly stopped with the engine running
    Driving,
    /// Maintenance mode: manual, or PARKED for a long time
    Garage,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::Parked
    }
}

impl std::fmt::Display for VehicleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VehicleState::Parked => write!(f, "PARKED"),
            VehicleState::Driving => write!(f, "DRIVING"),
            VehicleState::Garage => write!(f, "GARAGE"),
        }
    }
}

impl FromStr for VehicleState {
    type Err = OverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PARKED" => Ok(VehicleState::Parked),
            "DRIVING" => Ok(VehicleState::Driving),
            "GARAGE" => Ok(VehicleState::Garage),
            _ => Err(OverrideError::InvalidStateName(s.to_owned())),
        }
    }
}

/// A raw condition waiting out the hysteresis window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    pub candidate: VehicleState,
    pub since: Timestamp,
}

/// Everything the manager knows between polls
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Confirmed state
    pub state: VehicleState,
    /// When the confirmed state was entered
    pub entered_at: Timestamp,
    pub pending: Option<PendingTransition>,
    pub manual_override: Option<VehicleState>,
    /// Start of the current zero-speed interval
    pub stopped_since: Option<Timestamp>,
    /// Last sample actually received
    pub last_telemetry: Option<TelemetrySample>,
    /// Start of the current telemetry outage
    pub telemetry_lost_since: Option<Timestamp>,
}

impl StateSnapshot {
    fn new(now: Timestamp) -> Self {
        Self {
            state: VehicleState::Parked,
            entered_at: now,
            pending: None,
            manual_override: None,
            stopped_since: None,
            last_telemetry: None,
            telemetry_lost_since: None,
        }
    }
}

/// Pending candidate as reported in [`Diagnostics`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingDiagnostics {
    pub candidate: VehicleState,
    pub elapsed_secs: f64,
}

/// Point-in-time view for status displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub state: VehicleState,
    pub time_in_state_secs: f64,
    pub manual_override: Option<VehicleState>,
    pub last_telemetry: Option<TelemetrySample>,
    pub telemetry_available: bool,
    pub pending: Option<PendingDiagnostics>,
}

/// Owns the single [`StateSnapshot`] and applies the transition rules
pub struct StateManager {
    config: StateConfig,
    snapshot: StateSnapshot,
    /// Channel for emitting state events
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Create a manager in PARKED, applying any statically configured override
    pub fn new(config: StateConfig, event_tx: broadcast::Sender<StateEvent>, now: Timestamp) -> Self {
        let initial_override = config.initial_override;
        let mut manager = Self {
            config,
            snapshot: StateSnapshot::new(now),
            event_tx,
        };

        if let Some(state) = initial_override {
            if !manager.config.override_enabled {
                warn!(%state, "configured override ignored, manual override is disabled");
                return manager;
            }
            match manager.apply_override(state, now) {
                Ok(_) => info!(%state, "configured override applied at startup"),
                Err(e) => warn!(%state, error = %e, "configured override ignored"),
            }
        }

        manager
    }

    /// Get the confirmed state
    pub fn state(&self) -> VehicleState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    pub fn is_override_active(&self) -> bool {
        self.snapshot.manual_override.is_some()
    }

    /// Fold one telemetry poll (or its absence) into the confirmed state
    pub fn evaluate(&mut self, telemetry: Option<TelemetrySample>, now: Timestamp) -> VehicleState {
        let sample = self.observe(telemetry, now);
        self.track_stop(&sample, now);

        if let Some(pinned) = self.snapshot.manual_override {
            self.snapshot.pending = None;
            if pinned != self.snapshot.state {
                self.transition_to(pinned, TransitionCause::ManualOverride, now);
            }
            return pinned;
        }

        // GARAGE is only left through an override command
        if self.snapshot.state == VehicleState::Garage {
            self.snapshot.pending = None;
            if sample.speed_mph() >= self.config.speed_threshold_mph {
                debug!(speed_mph = sample.speed_mph(), "moving while in GARAGE");
            }
            return VehicleState::Garage;
        }

        let raw = self.raw_candidate(&sample, now);
        self.debounce(raw, now);
        self.promote_to_garage(now);

        self.snapshot.state
    }

    /// Set (`Some`) or clear (`None`) the manual override by state name
    pub fn set_override(&mut self, name: Option<&str>, now: Timestamp) -> Result<VehicleState, OverrideError> {
        match name {
            None => Ok(self.clear_override(now)),
            Some(name) => {
                if !self.config.override_enabled {
                    return Err(OverrideError::Disabled);
                }
                let requested = name.parse::<VehicleState>()?;
                self.apply_override(requested, now)
            }
        }
    }

    /// Drop the override and hand control back to automatic detection
    pub fn clear_override(&mut self, now: Timestamp) -> VehicleState {
        let previous = self.snapshot.manual_override.take();
        self.snapshot.pending = None;

        if self.snapshot.state == VehicleState::Garage {
            self.transition_to(VehicleState::Parked, TransitionCause::OverrideCleared, now);
        }

        let state = self.snapshot.state;
        match previous {
            Some(previous) => {
                info!(%previous, %state, "manual override cleared");
                self.emit(StateEvent::OverrideCleared { state });
            }
            None => debug!(%state, "clear requested with no override active"),
        }

        state
    }

    /// Return to the startup state: PARKED, no override, nothing pending
    pub fn reset(&mut self, now: Timestamp) -> VehicleState {
        let old_state = self.snapshot.state;
        if old_state != VehicleState::Parked {
            self.transition_to(VehicleState::Parked, TransitionCause::Reset, now);
        }
        self.snapshot = StateSnapshot::new(now);
        info!(from = %old_state, "state manager reset");
        self.snapshot.state
    }

    pub fn diagnostics(&self, now: Timestamp) -> Diagnostics {
        let snapshot = &self.snapshot;
        Diagnostics {
            state: snapshot.state,
            time_in_state_secs: now.saturating_since(snapshot.entered_at).as_secs_f64(),
            manual_override: snapshot.manual_override,
            last_telemetry: snapshot.last_telemetry,
            telemetry_available: snapshot.last_telemetry.is_some()
                && snapshot.telemetry_lost_since.is_none(),
            pending: snapshot.pending.map(|pending| PendingDiagnostics {
                candidate: pending.candidate,
                elapsed_secs: now.saturating_since(pending.since).as_secs_f64(),
            }),
        }
    }

    /// Record the poll and return the sample to decide on
    fn observe(&mut self, telemetry: Option<TelemetrySample>, now: Timestamp) -> TelemetrySample {
        match telemetry {
            Some(sample) => {
                if let Some(lost_since) = self.snapshot.telemetry_lost_since.take() {
                    let outage_ms = now.saturating_since(lost_since).as_millis() as u64;
                    info!(outage_ms, "telemetry restored");
                    self.emit(StateEvent::TelemetryRestored { outage_ms });
                }
                self.snapshot.last_telemetry = Some(sample);
                sample
            }
            None => {
                if self.snapshot.telemetry_lost_since.is_none() {
                    warn!(
                        state = %self.snapshot.state,
                        "telemetry unavailable, assuming stationary with engine off"
                    );
                    self.snapshot.telemetry_lost_since = Some(now);
                    self.emit(StateEvent::TelemetryLost);
                }
                TelemetrySample::conservative_default()
            }
        }
    }

    /// Any nonzero speed ends the current stop
    fn track_stop(&mut self, sample: &TelemetrySample, now: Timestamp) {
        if sample.is_stationary() {
            self.snapshot.stopped_since.get_or_insert(now);
        } else {
            self.snapshot.stopped_since = None;
        }
    }

    fn stopped_duration(&self, now: Timestamp) -> Duration {
        self.snapshot
            .stopped_since
            .map(|since| now.saturating_since(since))
            .unwrap_or(Duration::ZERO)
    }

    /// Instantaneous classification of a sample, before debouncing
    fn raw_candidate(&self, sample: &TelemetrySample, now: Timestamp) -> VehicleState {
        let confirmed = self.snapshot.state;

        if sample.speed_mph() >= self.config.speed_threshold_mph {
            return VehicleState::Driving;
        }

        // Creeping below the threshold neither starts nor ends a drive
        if !sample.is_stationary() {
            return confirmed;
        }

        if sample.parking_brake_engaged() {
            return VehicleState::Parked;
        }

        // Red light: a short stop with the engine running is still driving
        if confirmed == VehicleState::Driving
            && sample.engine_running()
            && self.stopped_duration(now) < self.config.idle_threshold()
        {
            VehicleState::Driving
        } else {
            VehicleState::Parked
        }
    }

    /// Commit `raw` once it has held for the hysteresis window
    fn debounce(&mut self, raw: VehicleState, now: Timestamp) {
        if raw == self.snapshot.state {
            if let Some(pending) = self.snapshot.pending.take() {
                debug!(candidate = %pending.candidate, "pending transition discarded");
            }
            return;
        }

        let since = match self.snapshot.pending {
            Some(pending) if pending.candidate == raw => pending.since,
            _ => {
                debug!(candidate = %raw, "pending transition started");
                self.snapshot.pending = Some(PendingTransition {
                    candidate: raw,
                    since: now,
                });
                now
            }
        };

        if now.saturating_since(since) >= self.config.hysteresis() {
            self.snapshot.pending = None;
            self.transition_to(raw, TransitionCause::Telemetry, now);
        }
    }

    /// PARKED long enough becomes GARAGE, unless a drive is about to start
    fn promote_to_garage(&mut self, now: Timestamp) {
        if self.snapshot.state == VehicleState::Parked
            && self.snapshot.pending.is_none()
            && now.saturating_since(self.snapshot.entered_at) >= self.config.garage_timeout()
        {
            self.transition_to(VehicleState::Garage, TransitionCause::GarageTimeout, now);
        }
    }

    fn apply_override(&mut self, requested: VehicleState, now: Timestamp) -> Result<VehicleState, OverrideError> {
        // Safety lock: no silencing the assistant while the vehicle is moving
        if requested != VehicleState::Driving && self.snapshot.state == VehicleState::Driving {
            let speed_mph = self.last_known_speed();
            if speed_mph > 0.0 {
                warn!(%requested, speed_mph, "override rejected while driving");
                return Err(OverrideError::Rejected {
                    requested,
                    speed_mph,
                });
            }
        }

        self.snapshot.manual_override = Some(requested);
        self.snapshot.pending = None;
        info!(state = %requested, "manual override set");
        self.emit(StateEvent::OverrideSet { state: requested });

        if requested != self.snapshot.state {
            self.transition_to(requested, TransitionCause::ManualOverride, now);
        }

        Ok(requested)
    }

    fn last_known_speed(&self) -> f64 {
        self.snapshot
            .last_telemetry
            .map(|sample| sample.speed_mph())
            .unwrap_or(0.0)
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: VehicleState, cause: TransitionCause, now: Timestamp) {
        let old_state = self.snapshot.state;
        let time_in_state_ms = now.saturating_since(self.snapshot.entered_at).as_millis() as u64;

        info!(
            from = %old_state,
            to = %new_state,
            %cause,
            time_in_state_ms,
            "state transition"
        );

        self.snapshot.state = new_state;
        self.snapshot.entered_at = now;

        self.emit(StateEvent::StateChanged {
            from: old_state,
            to: new_state,
            cause,
            time_in_state_ms,
        });
    }

    fn emit(&self, event: StateEvent) {
        debug!(?event, "emitting state event");
        let _ = self.event_tx.send(event);
    }
}
