//! TOML configuration for the control loop, loaded with defaults-on-missing
//! file and validated before use.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Calibration values for the specific vehicle, not tunable at runtime.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct RobotSpec {
    /// Maximum motor speed, in encoder pulses per second.
    pub max_pps: f64,
}

impl Default for RobotSpec {
    fn default() -> Self {
        Self { max_pps: 400.0 }
    }
}

/// Scanner/world-model geometry and the contact-obstacle opt-in.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    pub grid_size: f64,
    pub safe_distance: f64,
    pub grid_width: usize,
    pub grid_height: usize,
    pub marker_hold_ms: i64,
    /// Mirrors the older `GridScannerMap`'s behaviour of folding body
    /// contact sensors into the obstacle set; off by default.
    pub insert_contact_obstacles: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            grid_size: 0.2,
            safe_distance: 0.3,
            grid_width: 25,
            grid_height: 25,
            marker_hold_ms: 30_000,
            insert_contact_obstacles: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub connection_timeout_ms: u64,
    pub retry_connection_interval_ms: u64,
    pub read_timeout_ms: u64,
    /// Internal tick, ms.
    pub interval_ms: u64,
    /// Inference cadence, ms.
    pub reaction_interval_ms: u64,
    /// Motion command keep-alive, ms.
    pub command_interval_ms: u64,
    /// Scan command throttle, ms.
    pub scan_throttle_ms: u64,
    pub num_direction_values: usize,
    pub num_speed_values: usize,
    pub num_sensor_values: usize,
    pub num_radar_sectors: usize,
    pub min_radar_distance: f64,
    pub max_radar_distance: f64,
    pub marker_labels: Vec<String>,
    pub robot: RobotSpec,
    pub scanner: ScannerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            connection_timeout_ms: 2_000,
            retry_connection_interval_ms: 1_000,
            read_timeout_ms: 5_000,
            interval_ms: 10,
            reaction_interval_ms: 300,
            command_interval_ms: 750,
            scan_throttle_ms: 150,
            num_direction_values: 25,
            num_speed_values: 9,
            num_sensor_values: 7,
            num_radar_sectors: 25,
            min_radar_distance: 0.3,
            max_radar_distance: 3.0,
            marker_labels: Vec::new(),
            robot: RobotSpec::default(),
            scanner: ScannerConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            BridgeConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_speed_values <= 1 {
            return Err(ConfigError::Invalid(
                "numSpeedValues must be greater than 1".to_string(),
            ));
        }
        if self.num_direction_values <= 1 {
            return Err(ConfigError::Invalid(
                "numDirectionValues must be greater than 1".to_string(),
            ));
        }
        if self.num_sensor_values <= 1 {
            return Err(ConfigError::Invalid(
                "numSensorValues must be greater than 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.robot.max_pps, 400.0);
        assert!(!config.scanner.insert_contact_obstacles);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = BridgeConfig::load(Path::new("/nonexistent/bridge.toml")).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_toml_round_trip_with_partial_overrides() {
        let toml_str = r#"
            host = "10.0.0.5"
            port = 9001

            [robot]
            max_pps = 500.0

            [scanner]
            insert_contact_obstacles = true
        "#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9001);
        assert_eq!(config.robot.max_pps, 500.0);
        assert!(config.scanner.insert_contact_obstacles);
        // untouched fields keep their defaults.
        assert_eq!(config.interval_ms, 10);
        assert_eq!(config.scanner.grid_size, 0.2);
    }

    #[test]
    fn test_single_speed_value_rejected() {
        let config = BridgeConfig {
            num_speed_values: 1,
            ..BridgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_single_direction_value_rejected() {
        let config = BridgeConfig {
            num_direction_values: 1,
            ..BridgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
