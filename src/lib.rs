//! # MicroCut
//!
//! Stage and laser control for a laser-cutting microscope.
//!
//! ## Architecture
//!
//! MicroCut is organized as a workspace with multiple crates:
//!
//! 1. **microcut-core** - Geometry, shape instructions, status enums, errors, events
//! 2. **microcut-communication** - Stage command set, serial and simulated transports, laser
//! 3. **microcut-motion** - Backlash model, completion detection, group movement engine
//! 4. **microcut-settings** - Configuration file model and validation
//! 5. **microcut** - Logging setup, config mapping and the command line front end
//!
//! ## Features
//!
//! - **Backlash compensation**: logical positions hide the slack of each gear train
//! - **Group movements**: lines and quadrilaterals traced as two-axis vector moves
//! - **Laser gating**: emission only along edges, never during repositioning
//! - **Ring expansion**: burned borders and filled rectangles cut as concentric rings
//! - **Simulation**: an in-memory stage and laser for dry runs

use anyhow::Context;
use microcut_communication::{
    NpiLaser, SerialStage, SerialStageParams, SharedLaser, SharedTransport, SimulatedLaser,
    SimulatedStage,
};
use microcut_core::LaserStatus;
use microcut_motion::{MotionConfig, MotionController, TravelEnvelope};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use microcut_communication as communication;
pub use microcut_motion as motion;
pub use microcut_settings as settings;

pub use microcut_core::{
    AppEvent, ControllerStatus, Error, EventBus, JobEvent, MotionError, Point2, Point3, Result,
    ShapeInstruction,
};
pub use microcut_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("MICROCUT_BUILD_DATE");

/// Where the simulated stage starts, clear of the travel limits
pub const SIMULATED_START: [f64; 3] = [6.0, 6.0, 0.0];

/// Initialize logging with the default configuration
///
/// Console output with pretty formatting, filtered by `RUST_LOG` with INFO
/// as the floor.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Motion tuning taken from the stage, motion and laser sections
pub fn motion_config(config: &Config) -> MotionConfig {
    MotionConfig {
        backlash: config.stage.backlash,
        group_velocity: config.stage.group_velocity,
        group_acceleration: config.stage.group_acceleration,
        envelope: TravelEnvelope::new(config.stage.travel_min, config.stage.travel_max),
        stable_threshold: config.motion.stable_threshold,
        max_silent_polls: config.motion.max_silent_polls,
        spot_width: config.laser.spot_width,
        pixel_pitch: config.laser.pixel_pitch,
    }
}

/// Serial parameters of the stage port
pub fn stage_params(config: &Config) -> SerialStageParams {
    let connection = &config.connection;
    SerialStageParams {
        port: connection.stage_port.clone(),
        baud_rate: connection.stage_baud_rate,
        timeout: Duration::from_millis(connection.timeout_ms),
        settle: Duration::from_millis(connection.stage_settle_ms),
    }
}

/// Polling period of the tick runner
pub fn tick_period(config: &Config) -> Duration {
    Duration::from_millis(config.motion.tick_ms)
}

/// Read a job file: one editor string per line, blank lines and `#`
/// comments ignored
pub fn load_job(path: &Path) -> anyhow::Result<Vec<ShapeInstruction>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let lines = content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'));
    let instructions = microcut_core::parse_instructions(lines)
        .with_context(|| format!("Invalid job file {}", path.display()))?;
    if instructions.is_empty() {
        anyhow::bail!("Job file {} contains no instructions", path.display());
    }
    Ok(instructions)
}

/// Build a controller over the configured hardware, or over an in-memory
/// stage and laser when `simulate` is set
pub fn open_controller(
    config: &Config,
    simulate: bool,
    events: Arc<EventBus>,
) -> anyhow::Result<MotionController> {
    let (transport, laser): (SharedTransport, Option<SharedLaser>) = if simulate {
        tracing::info!("Using the simulated stage and laser");
        (
            Arc::new(Mutex::new(SimulatedStage::new(SIMULATED_START))) as SharedTransport,
            Some(Arc::new(Mutex::new(SimulatedLaser::new(LaserStatus::Ready))) as SharedLaser),
        )
    } else {
        let stage = SerialStage::connect(stage_params(config))
            .with_context(|| format!("Failed to open stage on {}", config.connection.stage_port))?;
        let laser = match &config.connection.laser_port {
            Some(port) => {
                let laser = NpiLaser::connect(
                    port,
                    config.connection.laser_baud_rate,
                    Duration::from_millis(config.connection.timeout_ms),
                    Duration::from_millis(config.connection.laser_settle_ms),
                )
                .with_context(|| format!("Failed to open laser on {}", port))?;
                Some(Arc::new(Mutex::new(laser)) as SharedLaser)
            }
            None => {
                tracing::warn!("No laser port configured, cutting disabled");
                None
            }
        };
        (Arc::new(Mutex::new(stage)) as SharedTransport, laser)
    };

    Ok(MotionController::new(
        transport,
        laser,
        motion_config(config),
        events,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_config_mapping() {
        let mut config = Config::default();
        config.stage.travel_max = 10.0;
        config.motion.max_silent_polls = Some(25);

        let motion = motion_config(&config);
        assert_eq!(motion.envelope, TravelEnvelope::new(0.0, 10.0));
        assert_eq!(motion.max_silent_polls, Some(25));
        assert_eq!(motion.backlash, [0.012, 0.009, 0.0]);

        // Defaults on both sides agree
        assert_eq!(motion_config(&Config::default()), MotionConfig::default());
    }

    #[test]
    fn test_stage_params_mapping() {
        let params = stage_params(&Config::default());
        assert_eq!(params.port, "/dev/ttyUSB0");
        assert_eq!(params.baud_rate, 921_600);
        assert_eq!(params.timeout, Duration::from_secs(1));
        assert_eq!(params.settle, Duration::from_millis(200));
        assert_eq!(tick_period(&Config::default()), Duration::from_millis(200));
    }
}
