//! Stage-space geometry.
//!
//! All coordinates are physical millimetres in the stage frame.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Planar point used by shape instructions and group moves (axes 1 and 2).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    /// Axis 1 coordinate.
    pub x: f64,
    /// Axis 2 coordinate.
    pub y: f64,
}

impl Point2 {
    /// Create a new point
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`
    pub fn distance_to(&self, other: &Point2) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    /// Round both coordinates to `decimals` places
    pub fn rounded(&self, decimals: i32) -> Self {
        Self::new(round_to(self.x, decimals), round_to(self.y, decimals))
    }
}

impl fmt::Display for Point2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Position of all three stage axes, as published to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    /// Axis 1 position.
    pub x: f64,
    /// Axis 2 position.
    pub y: f64,
    /// Axis 3 (focus) position.
    pub z: f64,
}

impl Point3 {
    /// Create a new position
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Planar part of the position
    pub fn xy(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Round `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
