//! Status and direction vocabulary shared by the stage and laser layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage controller status as derived from the polled status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ControllerStatus {
    /// Power on, nothing moving, no group or joystick mode active
    Ready,
    /// Exactly one axis in motion
    Moving,
    /// Two or more axes in motion, an active group, or joystick mode
    GroupMoving,
    /// Motor power off
    Off,
    /// No usable link to the controller
    #[default]
    Disconnected,
}

impl ControllerStatus {
    /// Whether a move is in flight
    pub fn is_moving(&self) -> bool {
        matches!(self, ControllerStatus::Moving | ControllerStatus::GroupMoving)
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerStatus::Ready => write!(f, "Ready"),
            ControllerStatus::Moving => write!(f, "Moving"),
            ControllerStatus::GroupMoving => write!(f, "GroupMoving"),
            ControllerStatus::Off => write!(f, "Off"),
            ControllerStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Direction of the most recent true (non-cancelling) move of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    /// Increasing position.
    #[default]
    Positive,
    /// Decreasing position.
    Negative,
}

impl Direction {
    /// +1.0 for positive, -1.0 for negative
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }

    /// The opposite direction
    pub fn reversed(&self) -> Self {
        match self {
            Direction::Positive => Direction::Negative,
            Direction::Negative => Direction::Positive,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Positive => write!(f, "+"),
            Direction::Negative => write!(f, "-"),
        }
    }
}

/// Status reported by the cutting laser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LaserStatus {
    /// Powered but not armed
    Power,
    /// Armed, emission can be enabled
    Ready,
    /// Emitting
    On,
    /// Laser reports a fault
    Error,
    /// No link or undecodable reply
    #[default]
    Disconnected,
}

impl fmt::Display for LaserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaserStatus::Power => write!(f, "POWER"),
            LaserStatus::Ready => write!(f, "READY"),
            LaserStatus::On => write!(f, "ON"),
            LaserStatus::Error => write!(f, "ERROR"),
            LaserStatus::Disconnected => write!(f, "DISCONNECTED"),
        }
    }
}
