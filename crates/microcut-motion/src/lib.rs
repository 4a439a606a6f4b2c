//! # MicroCut Motion
//!
//! Backlash-compensated stage motion. Each axis keeps a logical position
//! that hides the slack of its gear train; shapes are traced as two-axis
//! group moves whose completion is detected by polling; the laser is gated
//! at instruction boundaries; burned borders and filled rectangles are
//! expanded into concentric rings.

pub mod axis;
pub mod controller;
pub mod detector;
pub mod engine;
pub mod expander;
pub mod job;
pub mod runner;

pub use axis::{Axis, AxisTarget};
pub use controller::{MotionConfig, MotionController, MAX_AXIS_ACCELERATION, MAX_AXIS_VELOCITY};
pub use detector::{
    parse_group_position, parse_sample, DetectorEvent, DetectorMode, MotionCompletionDetector,
    PositionSample,
};
pub use engine::{
    Devices, EngineOutcome, GroupMovementEngine, TravelEnvelope, MAX_GROUP_ACCELERATION,
    MAX_GROUP_VELOCITY,
};
pub use expander::RingExpander;
pub use job::{GroupMovementJob, Step};
pub use runner::run_until_idle;
