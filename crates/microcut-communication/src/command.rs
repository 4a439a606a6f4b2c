//! Typed stage command set.
//!
//! Callers build [`StageCommand`] values with axis indices, positions and
//! motion parameters as separate fields; the text form sent over the wire is
//! produced here and nowhere else.

use microcut_core::round_to;
use std::fmt;

/// Decimal places used for every numeric argument on the wire
pub const WIRE_DECIMALS: i32 = 5;

/// A command understood by the stage controller
#[derive(Debug, Clone, PartialEq)]
pub enum StageCommand {
    /// Move one axis to an absolute position
    MoveAbsolute {
        /// Axis index (1-based).
        axis: u8,
        /// Target position in mm.
        position: f64,
    },
    /// Move one axis by a relative distance
    MoveRelative {
        /// Axis index (1-based).
        axis: u8,
        /// Distance in mm.
        distance: f64,
    },
    /// Ask for the actual position of one axis
    QueryPosition {
        /// Axis index (1-based).
        axis: u8,
    },
    /// Set the velocity of several axes
    SetVelocity {
        /// Axes to configure.
        axes: Vec<u8>,
        /// Velocity in mm/s.
        value: f64,
    },
    /// Read back the velocity of one axis
    QueryVelocity {
        /// Axis index (1-based).
        axis: u8,
    },
    /// Set the acceleration of several axes
    SetAcceleration {
        /// Axes to configure.
        axes: Vec<u8>,
        /// Acceleration in mm/s².
        value: f64,
    },
    /// Read back the acceleration of one axis
    QueryAcceleration {
        /// Axis index (1-based).
        axis: u8,
    },
    /// Run the origin search of one axis
    Home {
        /// Axis index (1-based).
        axis: u8,
    },
    /// Decelerate one axis to a stop
    StopAxis {
        /// Axis index (1-based).
        axis: u8,
    },
    /// Abort all motion immediately
    AbortMotion,
    /// Enable motor power
    MotorOn {
        /// Axes to power.
        axes: Vec<u8>,
    },
    /// Disable motor power
    MotorOff {
        /// Axes to switch off.
        axes: Vec<u8>,
    },
    /// Read the controller status byte
    Status,
    /// Create a two-axis group with its motion profile
    DefineGroup {
        /// Group number.
        group: u8,
        /// The two grouped axes.
        axes: (u8, u8),
        /// Vector velocity.
        velocity: f64,
        /// Vector acceleration.
        acceleration: f64,
        /// Vector deceleration.
        deceleration: f64,
    },
    /// Latch a linear move of the group to `(x, y)`
    GroupLatch {
        /// Group number.
        group: u8,
        /// First grouped axis target.
        x: f64,
        /// Second grouped axis target.
        y: f64,
    },
    /// Hold further commands until the group has stopped, plus `delay_ms`
    GroupWaitStop {
        /// Group number.
        group: u8,
        /// Extra delay after the stop.
        delay_ms: u32,
    },
    /// Ask for the position of both grouped axes
    GroupPosition {
        /// Group number.
        group: u8,
    },
    /// Delete the group
    GroupBreak {
        /// Group number.
        group: u8,
    },
    /// Hand the axes to the joystick
    JoystickMode,
    /// Return the axes to host command control
    CommandMode,
    /// Console passthrough, sent verbatim
    Raw(String),
}

/// Format a value the way the controller expects it: rounded, no `-0`
pub fn format_value(value: f64) -> String {
    let rounded = round_to(value, WIRE_DECIMALS);
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

fn axis_list(axes: &[u8], suffix: &str, separator: &str) -> String {
    axes.iter()
        .map(|a| format!("{}{}", a, suffix))
        .collect::<Vec<_>>()
        .join(separator)
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageCommand::MoveAbsolute { axis, position } => {
                write!(f, "{}PA{}", axis, format_value(*position))
            }
            StageCommand::MoveRelative { axis, distance } => {
                write!(f, "{}PR{}", axis, format_value(*distance))
            }
            StageCommand::QueryPosition { axis } => write!(f, "{}TP?", axis),
            StageCommand::SetVelocity { axes, value } => {
                let v = format_value(*value);
                f.write_str(&axis_list(axes, &format!("VA{}", v), "; "))
            }
            StageCommand::QueryVelocity { axis } => write!(f, "{}VA?", axis),
            StageCommand::SetAcceleration { axes, value } => {
                let a = format_value(*value);
                f.write_str(&axis_list(axes, &format!("AC{}", a), "; "))
            }
            StageCommand::QueryAcceleration { axis } => write!(f, "{}AC?", axis),
            StageCommand::Home { axis } => write!(f, "{}OR", axis),
            StageCommand::StopAxis { axis } => write!(f, "{}ST", axis),
            StageCommand::AbortMotion => f.write_str("AB"),
            StageCommand::MotorOn { axes } => write!(f, "{};", axis_list(axes, "MO", ";")),
            StageCommand::MotorOff { axes } => write!(f, "{};", axis_list(axes, "MF", ";")),
            StageCommand::Status => f.write_str("TS"),
            StageCommand::DefineGroup {
                group,
                axes,
                velocity,
                acceleration,
                deceleration,
            } => write!(
                f,
                "{g}HN{}, {};{g}HV{};{g}HA{};{g}HD{}",
                axes.0,
                axes.1,
                format_value(*velocity),
                format_value(*acceleration),
                format_value(*deceleration),
                g = group
            ),
            StageCommand::GroupLatch { group, x, y } => {
                write!(f, "{}HL{}, {}", group, format_value(*x), format_value(*y))
            }
            StageCommand::GroupWaitStop { group, delay_ms } => {
                write!(f, "{}HW{}", group, delay_ms)
            }
            StageCommand::GroupPosition { group } => write!(f, "{}HP", group),
            StageCommand::GroupBreak { group } => write!(f, "{}HX", group),
            StageCommand::JoystickMode => f.write_str(
                "BO0;1BP11,10,12;2BP9,8,12;3BP13,14,12;1BQ1;2BQ1;3BQ1;1TJ3;2TJ3;3TJ3;1MO;2MO;3MO",
            ),
            StageCommand::CommandMode => f.write_str("1BQ0;2BQ0;3BQ0;1TJ1;2TJ1;3TJ1"),
            StageCommand::Raw(text) => f.write_str(text),
        }
    }
}
