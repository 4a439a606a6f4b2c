//! Concentric ring generation for surface ablation.
//!
//! A burned border (`Rect` with a burn width) grows rings outward from the
//! drawn rectangle; a `DelRect` shrinks rings inward until the rectangle
//! would invert. Rings keep the rectangle's orientation and step by one
//! laser spot width.

use microcut_core::{Point2, ShapeInstruction};

const CORNER_DECIMALS: i32 = 5;
/// Absorbs float error when a ratio lands on an integer
const COUNT_EPSILON: f64 = 1e-9;

/// Corner sign pattern in cyclic order, relative to the two edge axes
const CORNER_SIGNS: [(f64, f64); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

/// Generator of concentric `SubRect` passes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingExpander {
    /// Laser spot width in mm; the distance between rings.
    pub spot_width: f64,
    /// Camera pixel pitch in mm/px, converting burn widths to mm.
    pub pixel_pitch: f64,
}

impl RingExpander {
    /// Create an expander
    pub fn new(spot_width: f64, pixel_pitch: f64) -> Self {
        Self {
            spot_width,
            pixel_pitch,
        }
    }

    /// Number of outward rings for a burn border of `burn_width_px`
    pub fn outward_ring_count(&self, burn_width_px: u32) -> usize {
        let width = f64::from(burn_width_px) * self.pixel_pitch;
        let rings = (width * std::f64::consts::SQRT_2 / self.spot_width - COUNT_EPSILON).ceil();
        rings.max(0.0) as usize
    }

    /// Number of inward rings that fit before the rectangle inverts
    pub fn inward_ring_count(&self, corners: &[Point2; 4]) -> usize {
        let side1 = corners[0].distance_to(&corners[1]);
        let side2 = corners[1].distance_to(&corners[2]);
        let half = side1.min(side2) / 2.0;
        (half / self.spot_width + COUNT_EPSILON).floor().max(0.0) as usize
    }

    /// Ring at `offset` (mm, negative shrinks) around the rectangle `corners`.
    ///
    /// Returns `None` when the rectangle has a zero-length edge.
    pub fn ring(&self, corners: &[Point2; 4], offset: f64) -> Option<[Point2; 4]> {
        let v1 = (corners[1].x - corners[0].x, corners[1].y - corners[0].y);
        let v2 = (corners[3].x - corners[0].x, corners[3].y - corners[0].y);
        let len1 = v1.0.hypot(v1.1);
        let len2 = v2.0.hypot(v2.1);
        if len1 <= f64::EPSILON || len2 <= f64::EPSILON {
            return None;
        }
        let axis_x = (v1.0 / len1, v1.1 / len1);
        let axis_y = (v2.0 / len2, v2.1 / len2);

        let center = Point2::new(
            corners.iter().map(|c| c.x).sum::<f64>() / 4.0,
            corners.iter().map(|c| c.y).sum::<f64>() / 4.0,
        );
        let half_x = len1 / 2.0 + offset;
        let half_y = len2 / 2.0 + offset;

        Some(CORNER_SIGNS.map(|(sx, sy)| {
            Point2::new(
                center.x + sx * half_x * axis_x.0 + sy * half_y * axis_y.0,
                center.y + sx * half_x * axis_x.1 + sy * half_y * axis_y.1,
            )
            .rounded(CORNER_DECIMALS)
        }))
    }

    /// Base rectangle, ring count and growth direction of an expanding shape
    fn plan<'a>(
        &self,
        instruction: &'a ShapeInstruction,
    ) -> Option<(&'a [Point2; 4], usize, f64)> {
        match instruction {
            ShapeInstruction::Rect {
                corners,
                burn_width_px,
                ..
            } if *burn_width_px > 0 => {
                Some((corners, self.outward_ring_count(*burn_width_px), 1.0))
            }
            ShapeInstruction::DelRect { corners, .. } => {
                Some((corners, self.inward_ring_count(corners), -1.0))
            }
            _ => None,
        }
    }

    /// Last ring `expand` would produce, computed without building the others
    pub fn outermost_ring(&self, instruction: &ShapeInstruction) -> Option<[Point2; 4]> {
        let (corners, count, direction) = self.plan(instruction)?;
        if count == 0 {
            return None;
        }
        self.ring(corners, direction * count as f64 * self.spot_width)
    }

    /// Rings to insert after `instruction`, in increasing ring order.
    ///
    /// Only a `Rect` with a burn width and a `DelRect` expand; every other
    /// instruction yields nothing.
    pub fn expand(&self, instruction: &ShapeInstruction) -> Vec<ShapeInstruction> {
        let Some((corners, count, direction)) = self.plan(instruction) else {
            return Vec::new();
        };

        let rings: Option<Vec<ShapeInstruction>> = (1..=count)
            .map(|k| {
                self.ring(corners, direction * k as f64 * self.spot_width)
                    .map(|corners| ShapeInstruction::SubRect { corners })
            })
            .collect();

        rings.unwrap_or_else(|| {
            tracing::warn!("Degenerate rectangle {:?}, no rings generated", corners);
            Vec::new()
        })
    }
}
