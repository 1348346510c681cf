//! Telemetry samples consumed by the state manager
//!
//! The telemetry collaborator delivers loosely shaped frames (OBD-II readings
//! where any PID may be unsupported). [`TelemetryFrame`] accepts that shape
//! and [`TelemetrySample`] is the validated form used for state decisions.

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// One validated telemetry reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Vehicle speed in mph
    speed_mph: f64,
    /// Engine speed in revolutions per minute
    rpm: f64,
    /// Parking brake state, when the vehicle reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parking_brake: Option<bool>,
}

impl TelemetrySample {
    /// Build a sample, rejecting negative or non-finite readings
    pub fn new(speed_mph: f64, rpm: f64) -> Result<Self, TelemetryError> {
        Ok(Self {
            speed_mph: check_reading("speed", speed_mph)?,
            rpm: check_reading("rpm", rpm)?,
            parking_brake: None,
        })
    }

    /// Attach a parking brake reading
    pub fn with_parking_brake(mut self, engaged: bool) -> Self {
        self.parking_brake = Some(engaged);
        self
    }

    /// Sample used whenever telemetry is unavailable: stationary, engine off
    pub fn conservative_default() -> Self {
        Self {
            speed_mph: 0.0,
            rpm: 0.0,
            parking_brake: None,
        }
    }

    pub fn speed_mph(&self) -> f64 {
        self.speed_mph
    }

    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    pub fn parking_brake(&self) -> Option<bool> {
        self.parking_brake
    }

    pub fn engine_running(&self) -> bool {
        self.rpm > 0.0
    }

    pub fn is_stationary(&self) -> bool {
        self.speed_mph == 0.0
    }

    pub fn parking_brake_engaged(&self) -> bool {
        self.parking_brake == Some(true)
    }
}

fn check_reading(field: &'static str, value: f64) -> Result<f64, TelemetryError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(TelemetryError::InvalidValue { field, value })
    }
}

/// Raw frame as delivered by the telemetry collaborator
///
/// Unsupported PIDs arrive as `null` and extra keys (coolant, throttle, ...)
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub rpm: Option<f64>,
    #[serde(default)]
    pub parking_brake: Option<bool>,
}

impl TryFrom<TelemetryFrame> for TelemetrySample {
    type Error = TelemetryError;

    fn try_from(frame: TelemetryFrame) -> Result<Self, Self::Error> {
        // A PID that did not answer reads as zero
        let sample = TelemetrySample::new(frame.speed.unwrap_or(0.0), frame.rpm.unwrap_or(0.0))?;
        Ok(match frame.parking_brake {
            Some(engaged) => sample.with_parking_brake(engaged),
            None => sample,
        })
    }
}

/// Turn an optional frame into an optional sample
///
/// Missing or malformed frames both come back as `Err`, which callers treat
/// as "telemetry unavailable".
pub fn sample_from_frame(frame: Option<TelemetryFrame>) -> Result<TelemetrySample, TelemetryError> {
    frame
        .ok_or(TelemetryError::Unavailable)
        .and_then(TelemetrySample::try_from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_running_derived_from_rpm() {
        assert!(TelemetrySample::new(0.0, 800.0).unwrap().engine_running());
        assert!(!TelemetrySample::new(0.0, 0.0).unwrap().engine_running());
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        assert_eq!(
            TelemetrySample::new(-1.0, 0.0),
            Err(TelemetryError::InvalidValue {
                field: "speed",
                value: -1.0
            })
        );
        assert!(TelemetrySample::new(10.0, f64::NAN).is_err());
        assert!(TelemetrySample::new(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_conservative_default() {
        let sample = TelemetrySample::conservative_default();
        assert!(sample.is_stationary());
        assert!(!sample.engine_running());
        assert!(!sample.parking_brake_engaged());
    }

    #[test]
    fn test_frame_with_nulls_and_extra_keys() {
        let json = r#"{"speed": null, "rpm": 812.5, "coolant_temp": 92.0}"#;
        let frame: TelemetryFrame = serde_json::from_str(json).unwrap();
        let sample = TelemetrySample::try_from(frame).unwrap();
        assert_eq!(sample.speed_mph(), 0.0);
        assert_eq!(sample.rpm(), 812.5);
        assert_eq!(sample.parking_brake(), None);
    }

    #[test]
    fn test_frame_parking_brake() {
        let frame = TelemetryFrame {
            speed: Some(0.0),
            rpm: Some(750.0),
            parking_brake: Some(true),
        };
        let sample = TelemetrySample::try_from(frame).unwrap();
        assert!(sample.parking_brake_engaged());
    }

    #[test]
    fn test_missing_frame_is_unavailable() {
        assert_eq!(sample_from_frame(None), Err(TelemetryError::Unavailable));
    }
}
