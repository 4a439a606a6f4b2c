//! Shape instructions handed over by the editor.
//!
//! The editor speaks a semicolon-delimited text format. It is parsed exactly
//! once, at the boundary, into [`ShapeInstruction`]; everything downstream
//! works on the typed form.
//!
//! Corner-bearing shapes keep their corners in cyclic order: top-left,
//! top-right, bottom-right, bottom-left (before rotation).

use crate::error::InstructionError;
use crate::geometry::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discriminant of a [`ShapeInstruction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    /// Two-point cut
    Line,
    /// Rectangle outline, optionally with a burned border
    Rect,
    /// Free quadrilateral outline
    Quadr,
    /// Filled burn-out rectangle
    DelRect,
    /// Concentric ring generated at runtime
    SubRect,
}

impl ShapeKind {
    /// Tag used by the editor text format
    pub fn tag(&self) -> &'static str {
        match self {
            ShapeKind::Line => "line",
            ShapeKind::Rect => "rect",
            ShapeKind::Quadr => "quadr",
            ShapeKind::DelRect => "del_rect",
            ShapeKind::SubRect => "subrect",
        }
    }

    /// Whether the path returns to its start corner
    pub fn is_closed(&self) -> bool {
        !matches!(self, ShapeKind::Line)
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single shape of a group movement job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeInstruction {
    /// Straight cut from `start` to `end`
    Line {
        /// First point.
        start: Point2,
        /// Second point.
        end: Point2,
    },
    /// Rectangle; `burn_width_px == 0` is an outline only
    Rect {
        /// Corners in cyclic order.
        corners: [Point2; 4],
        /// Rotation in degrees, as drawn.
        rotation: f64,
        /// Width of the burned border in camera pixels.
        burn_width_px: u32,
    },
    /// Quadrilateral outline
    Quadr {
        /// Corners in cyclic order.
        corners: [Point2; 4],
    },
    /// Rectangle whose whole surface is ablated
    DelRect {
        /// Corners in cyclic order.
        corners: [Point2; 4],
        /// Rotation in degrees, as drawn.
        rotation: f64,
    },
    /// One ring of a burn operation
    SubRect {
        /// Corners in cyclic order.
        corners: [Point2; 4],
    },
}

impl ShapeInstruction {
    /// Kind of this instruction
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeInstruction::Line { .. } => ShapeKind::Line,
            ShapeInstruction::Rect { .. } => ShapeKind::Rect,
            ShapeInstruction::Quadr { .. } => ShapeKind::Quadr,
            ShapeInstruction::DelRect { .. } => ShapeKind::DelRect,
            ShapeInstruction::SubRect { .. } => ShapeKind::SubRect,
        }
    }

    /// Corners of a corner-bearing shape
    pub fn corners(&self) -> Option<&[Point2; 4]> {
        match self {
            ShapeInstruction::Line { .. } => None,
            ShapeInstruction::Rect { corners, .. }
            | ShapeInstruction::Quadr { corners }
            | ShapeInstruction::DelRect { corners, .. }
            | ShapeInstruction::SubRect { corners } => Some(corners),
        }
    }

    /// Declared start point
    pub fn start(&self) -> Point2 {
        match self {
            ShapeInstruction::Line { start, .. } => *start,
            other => other.corners().map(|c| c[0]).unwrap_or_default(),
        }
    }

    /// Point visited at `index` along the path.
    ///
    /// Index 0 is the start point. A line has one more point; closed shapes
    /// visit corners 2, 3 and 4 and then return to the start at index 4.
    pub fn path_point(&self, index: usize) -> Option<Point2> {
        match (self, index) {
            (ShapeInstruction::Line { start, .. }, 0) => Some(*start),
            (ShapeInstruction::Line { end, .. }, 1) => Some(*end),
            (ShapeInstruction::Line { .. }, _) => None,
            (shape, i) if i <= 4 => shape.corners().map(|c| c[i % 4]),
            _ => None,
        }
    }

    /// Every point the path touches, used for envelope checks
    pub fn points(&self) -> Vec<Point2> {
        match self {
            ShapeInstruction::Line { start, end } => vec![*start, *end],
            other => other.corners().map(|c| c.to_vec()).unwrap_or_default(),
        }
    }

    /// Rotation of rectangular shapes, zero otherwise
    pub fn rotation(&self) -> f64 {
        match self {
            ShapeInstruction::Rect { rotation, .. } | ShapeInstruction::DelRect { rotation, .. } => {
                *rotation
            }
            _ => 0.0,
        }
    }
}

impl FromStr for ShapeInstruction {
    type Err = InstructionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
        let parts: Vec<&str> = body.split(';').map(str::trim).collect();
        let malformed = |reason: &str| InstructionError::Malformed {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let expected = match parts[0] {
            "line" => 5,
            "quadr" => 9,
            "rect" => 11,
            "del_rect" => 10,
            "subrect" => {
                return Err(malformed("subrect is generated internally"));
            }
            other => {
                return Err(InstructionError::UnknownKind {
                    kind: other.to_string(),
                })
            }
        };
        if parts.len() != expected {
            return Err(malformed(&format!(
                "expected {} fields, found {}",
                expected,
                parts.len()
            )));
        }

        let number = |i: usize| -> Result<f64, InstructionError> {
            parts[i]
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| malformed(&format!("field {} is not a number: '{}'", i, parts[i])))
        };
        let point = |i: usize| -> Result<Point2, InstructionError> {
            Ok(Point2::new(number(i)?, number(i + 1)?))
        };
        let corners = || -> Result<[Point2; 4], InstructionError> {
            Ok([point(1)?, point(3)?, point(5)?, point(7)?])
        };

        match parts[0] {
            "line" => Ok(ShapeInstruction::Line {
                start: point(1)?,
                end: point(3)?,
            }),
            "quadr" => Ok(ShapeInstruction::Quadr {
                corners: corners()?,
            }),
            "rect" => {
                let burn_width_px = parts[10]
                    .parse::<u32>()
                    .map_err(|_| malformed(&format!("invalid burn width '{}'", parts[10])))?;
                Ok(ShapeInstruction::Rect {
                    corners: corners()?,
                    rotation: number(9)?,
                    burn_width_px,
                })
            }
            _ => Ok(ShapeInstruction::DelRect {
                corners: corners()?,
                rotation: number(9)?,
            }),
        }
    }
}

/// Parse a list of editor strings, stopping at the first bad one
pub fn parse_instructions<I, S>(lines: I) -> Result<Vec<ShapeInstruction>, InstructionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter(|l| !l.as_ref().trim().is_empty())
        .map(|l| l.as_ref().parse())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let shape: ShapeInstruction = "line;3.0;4.0;2.2;3.3".parse().unwrap();
        assert_eq!(
            shape,
            ShapeInstruction::Line {
                start: Point2::new(3.0, 4.0),
                end: Point2::new(2.2, 3.3),
            }
        );
        assert_eq!(shape.path_point(1), Some(Point2::new(2.2, 3.3)));
        assert_eq!(shape.path_point(2), None);
    }

    #[test]
    fn test_parse_rect_with_burn() {
        let shape: ShapeInstruction = "rect;1;1;2;1;2;2;1;2;0;12".parse().unwrap();
        match shape {
            ShapeInstruction::Rect { burn_width_px, corners, .. } => {
                assert_eq!(burn_width_px, 12);
                assert_eq!(corners[2], Point2::new(2.0, 2.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_quadr_trailing_separator() {
        let shape: ShapeInstruction = "quadr;1;1;2;1;2;2;1;2;".parse().unwrap();
        assert_eq!(shape.kind(), ShapeKind::Quadr);
        assert_eq!(shape.path_point(4), Some(Point2::new(1.0, 1.0)));
    }

    #[test]
    fn test_reject_subrect_and_unknown() {
        assert!(matches!(
            "subrect;1;1;2;1;2;2;1;2".parse::<ShapeInstruction>(),
            Err(InstructionError::Malformed { .. })
        ));
        assert!(matches!(
            "arc;1;1;2;2;90".parse::<ShapeInstruction>(),
            Err(InstructionError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_reject_bad_numbers() {
        assert!("line;3.0;abc;2.2;3.3".parse::<ShapeInstruction>().is_err());
        assert!("line;3.0;4.0;2.2".parse::<ShapeInstruction>().is_err());
        assert!("rect;1;1;2;1;2;2;1;2;0;-3".parse::<ShapeInstruction>().is_err());
        assert!("line;NaN;4.0;2.2;3.3".parse::<ShapeInstruction>().is_err());
    }
}
