//! # Host Configuration
//!
//! TOML configuration for the laser host: the registered device settings the
//! interpreter reads and writes, the tick driver cadence, and logging.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [device]
//! opt_rapid_between = false
//! opt_jog_minimum = 256
//!
//! [driver]
//! tick_interval_ms = 2
//! event_capacity = 512
//!
//! [log]
//! level = "debug"
//! ```
//!
//! Every field is optional; missing fields take their registration defaults.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the device settings, driver, and logging.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Named device settings with their registration defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceSettings {
    #[serde(default)]
    pub current_x: i32,
    #[serde(default)]
    pub current_y: i32,
    #[serde(default = "default_rapid_between")]
    pub opt_rapid_between: bool,
    #[serde(default)]
    pub opt_jog_mode: i32,
    #[serde(default = "default_jog_minimum")]
    pub opt_jog_minimum: i32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            current_x: 0,
            current_y: 0,
            opt_rapid_between: default_rapid_between(),
            opt_jog_mode: 0,
            opt_jog_minimum: default_jog_minimum(),
        }
    }
}

/// Tick driver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("driver.tick_interval_ms must be > 0".to_string()));
        }
        if self.driver.event_capacity == 0 {
            return Err(ConfigError::Invalid("driver.event_capacity must be > 0".to_string()));
        }
        if self.device.opt_jog_minimum < 0 {
            return Err(ConfigError::Invalid("device.opt_jog_minimum must be >= 0".to_string()));
        }
        if self.log.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!("unknown log level '{}'", self.log.level)));
        }
        Ok(())
    }
}

// Default value functions
fn default_rapid_between() -> bool { true }
fn default_jog_minimum() -> i32 { 127 }
fn default_tick_interval_ms() -> u64 { 1 }
fn default_event_capacity() -> usize { 256 }
fn default_log_level() -> String { "info".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.device.current_x, 0);
        assert_eq!(config.device.current_y, 0);
        assert!(config.device.opt_rapid_between);
        assert_eq!(config.device.opt_jog_mode, 0);
        assert_eq!(config.device.opt_jog_minimum, 127);
        assert_eq!(config.driver.tick_interval_ms, 1);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[device]\nopt_rapid_between = false\nopt_jog_minimum = 256\n\n[driver]\ntick_interval_ms = 5").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert!(!config.device.opt_rapid_between);
        assert_eq!(config.device.opt_jog_minimum, 256);
        assert_eq!(config.driver.tick_interval_ms, 5);
        // Defaults for missing fields
        assert_eq!(config.device.opt_jog_mode, 0);
        assert_eq!(config.driver.event_capacity, 256);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_load_config_rejects_zero_interval() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("zero.toml");
        std::fs::write(&file_path, "[driver]\ntick_interval_ms = 0\n").unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_log_level_is_invalid() {
        let config: Config = toml::from_str("[log]\nlevel = \"chatty\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
