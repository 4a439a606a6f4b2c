//! MicroCut Settings Crate
//!
//! Loads, validates and saves the configuration file.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, LaserSettings, MotionSettings, StageSettings};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
