//! Configuration loading and management
//!
//! Built once at startup from defaults, an optional JSON file and a handful
//! of environment overrides, then handed out by reference or clone. Nothing
//! looks configuration up at call time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::state::VehicleState;
use crate::validator::{ResponseValidator, ValidatorPolicy};

/// Thresholds and switches for state detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Speed at or above which the vehicle counts as moving (mph)
    pub speed_threshold_mph: f64,
    /// How long a stop with the engine running stays DRIVING (seconds)
    pub idle_threshold_secs: f64,
    /// How long a raw condition must hold before it is confirmed (seconds)
    pub hysteresis_secs: f64,
    /// PARKED time before automatic promotion to GARAGE (seconds)
    pub garage_timeout_secs: f64,
    pub override_enabled: bool,
    /// Override applied at startup
    pub initial_override: Option<VehicleState>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            speed_threshold_mph: 5.0,
            idle_threshold_secs: 10.0,
            hysteresis_secs: 3.0,
            garage_timeout_secs: 1800.0,
            override_enabled: true,
            initial_override: None,
        }
    }
}

impl StateConfig {
    pub fn idle_threshold(&self) -> Duration {
        secs(self.idle_threshold_secs)
    }

    pub fn hysteresis(&self) -> Duration {
        secs(self.hysteresis_secs)
    }

    pub fn garage_timeout(&self) -> Duration {
        secs(self.garage_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("idle_threshold_secs", self.idle_threshold_secs),
            ("hysteresis_secs", self.hysteresis_secs),
            ("garage_timeout_secs", self.garage_timeout_secs),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { field, value });
            }
        }
        // Zero would classify a parked car as moving
        if !self.speed_threshold_mph.is_finite() || self.speed_threshold_mph <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                field: "speed_threshold_mph",
                value: self.speed_threshold_mph,
            });
        }
        Ok(())
    }
}

fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub state: StateConfig,

    pub validator: ValidatorPolicy,
}

/// On-disk shape of the optional config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    socket_path: Option<PathBuf>,
    state: StateConfig,
    validator: ValidatorPolicy,
}

impl Config {
    /// Load configuration from defaults, the config file and environment
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("drive-guard");

        // An explicitly named file must exist; the default one is optional
        let file = match std::env::var_os("DRIVE_GUARD_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                Some(read_file(&path).with_context(|| format!("loading {}", path.display()))?)
            }
            None => {
                let path = data_dir.join("config.json");
                if path.exists() {
                    Some(read_file(&path).with_context(|| format!("loading {}", path.display()))?)
                } else {
                    None
                }
            }
        };

        let mut config = Self::from_file(data_dir, file.unwrap_or_default());
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self::from_file(data_dir, ConfigFile::default())
    }

    fn from_file(data_dir: PathBuf, file: ConfigFile) -> Self {
        let socket_path = file
            .socket_path
            .unwrap_or_else(|| data_dir.join("daemon.sock"));
        Self {
            socket_path,
            data_dir,
            state: file.state,
            validator: file.validator,
        }
    }

    /// Apply `DRIVE_GUARD_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let numbers: [(&'static str, &mut f64); 4] = [
            ("DRIVE_GUARD_SPEED_THRESHOLD", &mut self.state.speed_threshold_mph),
            ("DRIVE_GUARD_IDLE_THRESHOLD", &mut self.state.idle_threshold_secs),
            ("DRIVE_GUARD_HYSTERESIS", &mut self.state.hysteresis_secs),
            ("DRIVE_GUARD_GARAGE_TIMEOUT", &mut self.state.garage_timeout_secs),
        ];
        for (name, slot) in numbers {
            if let Some(raw) = lookup(name) {
                *slot = raw.trim().parse().map_err(|e: std::num::ParseFloatError| {
                    ConfigError::InvalidEnv {
                        name,
                        reason: e.to_string(),
                    }
                })?;
                debug!(name, value = *slot, "environment override");
            }
        }

        if let Some(raw) = lookup("DRIVE_GUARD_MAX_LEN") {
            self.validator.max_len = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    name: "DRIVE_GUARD_MAX_LEN",
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(raw) = lookup("DRIVE_GUARD_OVERRIDE") {
            self.state.initial_override = match raw.trim() {
                "" => None,
                value if value.eq_ignore_ascii_case("none") => None,
                value => Some(value.parse().map_err(|e: crate::error::OverrideError| {
                    ConfigError::InvalidEnv {
                        name: "DRIVE_GUARD_OVERRIDE",
                        reason: e.to_string(),
                    }
                })?),
            };
        }

        if let Some(raw) = lookup("DRIVE_GUARD_SOCKET") {
            self.socket_path = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Check every threshold and that the validator policy is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.state.validate()?;
        ResponseValidator::new(self.validator.clone())?;
        Ok(())
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("drive-guard"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::with_data_dir(PathBuf::from("/tmp/drive-guard"));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/drive-guard/daemon.sock"));
        assert_eq!(config.state.speed_threshold_mph, 5.0);
        assert_eq!(config.state.idle_threshold(), Duration::from_secs(10));
        assert_eq!(config.state.hysteresis(), Duration::from_secs(3));
        assert_eq!(config.state.garage_timeout(), Duration::from_secs(1800));
        assert_eq!(config.validator.max_len, 150);
        assert_eq!(config.validator.fallback_phrase, "Monitoring.");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::with_data_dir(PathBuf::from("/tmp/drive-guard"));
        config
            .apply_env(env(&[
                ("DRIVE_GUARD_HYSTERESIS", "1.5"),
                ("DRIVE_GUARD_MAX_LEN", "90"),
                ("DRIVE_GUARD_OVERRIDE", "garage"),
                ("DRIVE_GUARD_SOCKET", "/run/drive-guard.sock"),
            ]))
            .unwrap();

        assert_eq!(config.state.hysteresis(), Duration::from_millis(1500));
        assert_eq!(config.validator.max_len, 90);
        assert_eq!(config.state.initial_override, Some(VehicleState::Garage));
        assert_eq!(config.socket_path, PathBuf::from("/run/drive-guard.sock"));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::with_data_dir(PathBuf::from("/tmp/drive-guard"));
        let err = config
            .apply_env(env(&[("DRIVE_GUARD_OVERRIDE", "airborne")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "DRIVE_GUARD_OVERRIDE",
                ..
            }
        ));

        let err = config
            .apply_env(env(&[("DRIVE_GUARD_IDLE_THRESHOLD", "ten")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_validate_thresholds() {
        let mut config = Config::with_data_dir(PathBuf::from("/tmp/drive-guard"));
        config.state.hysteresis_secs = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold {
                field: "hysteresis_secs",
                ..
            })
        ));

        config.state.hysteresis_secs = 3.0;
        config.state.speed_threshold_mph = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_noncompliant_fallback() {
        let mut config = Config::with_data_dir(PathBuf::from("/tmp/drive-guard"));
        config.validator.fallback_phrase = "Anything else, darling?".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonCompliantFallback { .. })
        ));
    }

    #[test]
    fn test_partial_config_file() {
        let json = r#"{
            "state": { "garage_timeout_secs": 600 },
            "validator": { "max_len": 120, "fallback_phrase": "Noted." }
        }"#;
        let file: ConfigFile = serde_json::from_str(json).unwrap();
        let config = Config::from_file(PathBuf::from("/tmp/drive-guard"), file);

        assert_eq!(config.state.garage_timeout(), Duration::from_secs(600));
        assert_eq!(config.state.speed_threshold_mph, 5.0);
        assert_eq!(config.validator.max_len, 120);
        assert_eq!(config.validator.fallback_phrase, "Noted.");
        assert!(!config.validator.affectionate_terms.is_empty());
        assert!(config.validate().is_ok());
    }
}
