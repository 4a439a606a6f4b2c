//! Configuration for MicroCut
//!
//! Configuration is organized into logical sections:
//! - Connection settings (stage and laser ports, timing)
//! - Stage settings (backlash, group motion, travel envelope)
//! - Motion settings (polling period and completion debounce)
//! - Laser settings (spot width, camera scale)
//!
//! Files are JSON or TOML, chosen by extension. Missing sections and keys
//! fall back to their defaults.

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Stage controller serial port
    pub stage_port: String,
    /// Stage controller baud rate
    pub stage_baud_rate: u32,
    /// Laser serial port; no laser when unset
    pub laser_port: Option<String>,
    /// Laser baud rate
    pub laser_baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub timeout_ms: u64,
    /// Time the stage controller gets to answer a synchronous command
    pub stage_settle_ms: u64,
    /// Time the laser gets to answer a synchronous command
    pub laser_settle_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            stage_port: "/dev/ttyUSB0".to_string(),
            stage_baud_rate: 921_600,
            laser_port: None,
            laser_baud_rate: 115_200,
            timeout_ms: 1000,
            stage_settle_ms: 200,
            laser_settle_ms: 900,
        }
    }
}

/// Stage mechanics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Backlash of axes 1..3 in mm
    pub backlash: [f64; 3],
    /// Group vector velocity in mm/s
    pub group_velocity: f64,
    /// Group vector acceleration in mm/s²
    pub group_acceleration: f64,
    /// Lower travel limit of the grouped axes in mm
    pub travel_min: f64,
    /// Upper travel limit of the grouped axes in mm
    pub travel_max: f64,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            backlash: [0.012, 0.009, 0.0],
            group_velocity: 0.2,
            group_acceleration: 0.8,
            travel_min: 0.0,
            travel_max: 12.0,
        }
    }
}

/// Polling and completion detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Polling period in milliseconds
    pub tick_ms: u64,
    /// A move completes once this many repeated samples have been exceeded
    pub stable_threshold: u32,
    /// Consecutive empty polls before the stage counts as lost; unset polls forever
    pub max_silent_polls: Option<u32>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            stable_threshold: 2,
            max_silent_polls: None,
        }
    }
}

/// Laser optics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserSettings {
    /// Focused spot width in mm
    pub spot_width: f64,
    /// Camera pixel pitch in mm per pixel
    pub pixel_pitch: f64,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            spot_width: 0.001,
            pixel_pitch: 0.000089,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Stage mechanics
    pub stage: StageSettings,
    /// Polling settings
    pub motion: MotionSettings,
    /// Laser optics
    pub laser: LaserSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> ConfigResult<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location in the platform config directory
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("microcut").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no config or home directory".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating the parent directory
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let connection = &self.connection;
        if connection.stage_baud_rate == 0 {
            return Err(ConfigError::out_of_range(
                "connection.stage_baud_rate",
                connection.stage_baud_rate,
                "> 0",
            ));
        }
        if connection.laser_baud_rate == 0 {
            return Err(ConfigError::out_of_range(
                "connection.laser_baud_rate",
                connection.laser_baud_rate,
                "> 0",
            ));
        }
        if connection.timeout_ms == 0 {
            return Err(ConfigError::out_of_range(
                "connection.timeout_ms",
                connection.timeout_ms,
                "> 0",
            ));
        }

        let stage = &self.stage;
        if let Some(b) = stage.backlash.iter().find(|b| !(**b >= 0.0)) {
            return Err(ConfigError::out_of_range("stage.backlash", b, ">= 0"));
        }
        if !(stage.group_velocity > 0.0 && stage.group_velocity <= 0.4) {
            return Err(ConfigError::out_of_range(
                "stage.group_velocity",
                stage.group_velocity,
                "0 < v <= 0.4",
            ));
        }
        if !(stage.group_acceleration > 0.0 && stage.group_acceleration <= 1.6) {
            return Err(ConfigError::out_of_range(
                "stage.group_acceleration",
                stage.group_acceleration,
                "0 < a <= 1.6",
            ));
        }
        if !(stage.travel_min < stage.travel_max) {
            return Err(ConfigError::out_of_range(
                "stage.travel_max",
                stage.travel_max,
                "> stage.travel_min",
            ));
        }

        if self.motion.tick_ms < 10 {
            return Err(ConfigError::out_of_range(
                "motion.tick_ms",
                self.motion.tick_ms,
                ">= 10",
            ));
        }

        if !(self.laser.spot_width > 0.0) {
            return Err(ConfigError::out_of_range(
                "laser.spot_width",
                self.laser.spot_width,
                "> 0",
            ));
        }
        if !(self.laser.pixel_pitch > 0.0) {
            return Err(ConfigError::out_of_range(
                "laser.pixel_pitch",
                self.laser.pixel_pitch,
                "> 0",
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
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.stage_baud_rate, 921_600);
        assert_eq!(config.stage.backlash, [0.012, 0.009, 0.0]);
        assert_eq!(config.motion.max_silent_polls, None);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::new();
        config.stage.group_velocity = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { ref key, .. }) if key == "stage.group_velocity"
        ));

        let mut config = Config::new();
        config.stage.backlash[1] = -0.001;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.stage.travel_min = 12.0;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.motion.tick_ms = 5;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.laser.spot_width = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_by_extension() {
        assert_eq!(format_of(Path::new("a.json")), Ok(Format::Json));
        assert_eq!(format_of(Path::new("a.toml")), Ok(Format::Toml));
        assert_eq!(
            format_of(Path::new("a.yaml")),
            Err(ConfigError::UnsupportedFormat("yaml".to_string()))
        );
    }
}
