//! Per-axis position model with backlash compensation.
//!
//! The gear train of each axis has a small amount of slack. The first move
//! after a direction reversal overtravels by `backlash` to take it up; that
//! overtravel stays applied (`has_offset`) and is either repeated on every
//! following move in the same direction or cancelled by the next reversal.
//! The raw motor reading is therefore off by at most one backlash increment
//! from the logical position, in `last_direction`.

use microcut_core::{round_to, Direction};

/// Decimal places used when comparing requested and current positions
const COMPARE_DECIMALS: i32 = 3;
/// Decimal places kept for positions and send values
const POSITION_DECIMALS: i32 = 5;

/// Raw target for a requested logical position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTarget {
    /// Value to command the motor with.
    pub send_value: f64,
    /// The move reverses the axis; a group move must take up the slack first.
    pub causes_relative_pre_move: bool,
}

/// One physical stage axis
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// Axis index (1-based).
    pub index: u8,
    /// Position the rest of the system trusts, in mm.
    pub logical_position: f64,
    /// Last position reported by the motor.
    pub raw_motor_position: f64,
    /// Direction of the most recent true move.
    pub last_direction: Direction,
    /// A backlash increment is applied and outstanding.
    pub has_offset: bool,
    /// Backlash magnitude in mm.
    pub backlash: f64,
}

impl Axis {
    /// Create an axis at rest at 0 with the given backlash
    pub fn new(index: u8, backlash: f64) -> Self {
        Self {
            index,
            logical_position: 0.0,
            raw_motor_position: 0.0,
            last_direction: Direction::Positive,
            has_offset: false,
            backlash,
        }
    }

    /// Compute the raw target for `requested` and update the direction and
    /// offset bookkeeping accordingly.
    pub fn compute_target(&mut self, requested: f64) -> AxisTarget {
        let wanted = round_to(requested, COMPARE_DECIMALS);
        let current = round_to(self.logical_position, COMPARE_DECIMALS);

        let mut send_value = requested;
        let mut causes_relative_pre_move = false;

        let travel = if wanted > current {
            Some(Direction::Positive)
        } else if wanted < current {
            Some(Direction::Negative)
        } else {
            None
        };

        match travel {
            Some(direction) if direction != self.last_direction => {
                self.last_direction = direction;
                causes_relative_pre_move = true;
                if self.has_offset {
                    self.has_offset = false;
                } else {
                    send_value += direction.sign() * self.backlash;
                    self.has_offset = true;
                }
            }
            Some(direction) => {
                if self.has_offset {
                    send_value += direction.sign() * self.backlash;
                }
            }
            None => {
                if self.has_offset {
                    send_value += self.last_direction.sign() * self.backlash;
                }
            }
        }

        AxisTarget {
            send_value: round_to(send_value, POSITION_DECIMALS),
            causes_relative_pre_move,
        }
    }

    /// Raw target of the slack take-up move preceding a reversing group move
    pub fn pre_move_target(&self) -> f64 {
        round_to(
            self.raw_motor_position + self.last_direction.sign() * self.backlash,
            POSITION_DECIMALS,
        )
    }

    /// Logical position corresponding to a raw motor reading
    pub fn logical_from_raw(&self, raw: f64) -> f64 {
        let corrected = if self.has_offset {
            raw - self.last_direction.sign() * self.backlash
        } else {
            raw
        };
        round_to(corrected, POSITION_DECIMALS)
    }

    /// Record a raw sample taken while the axis is travelling.
    ///
    /// The logical position only follows samples that progress in the
    /// direction of travel; a sample behind the current logical position is
    /// the slack being taken up and is ignored. Returns whether the logical
    /// position changed.
    pub fn apply_raw_sample(&mut self, raw: f64) -> bool {
        self.raw_motor_position = round_to(raw, POSITION_DECIMALS);
        let candidate = self.logical_from_raw(raw);
        let regresses = match self.last_direction {
            Direction::Positive => candidate < self.logical_position,
            Direction::Negative => candidate > self.logical_position,
        };
        if regresses || candidate == self.logical_position {
            return false;
        }
        self.logical_position = candidate;
        true
    }

    /// Adopt a raw reading taken at rest
    pub fn settle(&mut self, raw: f64) {
        self.raw_motor_position = round_to(raw, POSITION_DECIMALS);
        self.logical_position = self.logical_from_raw(raw);
    }
}
