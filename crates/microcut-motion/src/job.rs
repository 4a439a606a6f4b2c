//! Group movement job state.

use microcut_core::{ShapeInstruction, ShapeKind};
use std::fmt;

/// Step of the current instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    /// Expand rings if needed, travel to the start point.
    Start,
    /// Gate the laser on, travel to the second point.
    FirstEdge,
    /// Travel to corner 3.
    SecondEdge,
    /// Travel to corner 4.
    ThirdEdge,
    /// Travel back to the start corner.
    ClosePath,
    /// Gate the laser off, tear down or continue with the next instruction.
    Finalize,
}

impl Step {
    /// Numeric step (0..=5)
    pub fn index(&self) -> u8 {
        match self {
            Step::Start => 0,
            Step::FirstEdge => 1,
            Step::SecondEdge => 2,
            Step::ThirdEdge => 3,
            Step::ClosePath => 4,
            Step::Finalize => 5,
        }
    }

    /// The step following this one in a closed path
    pub fn next(&self) -> Step {
        match self {
            Step::Start => Step::FirstEdge,
            Step::FirstEdge => Step::SecondEdge,
            Step::SecondEdge => Step::ThirdEdge,
            Step::ThirdEdge => Step::ClosePath,
            Step::ClosePath | Step::Finalize => Step::Finalize,
        }
    }

    /// Step entered when the move issued in `self` has finished
    pub fn after_move(&self, kind: ShapeKind, stop_requested: bool) -> Step {
        if stop_requested {
            Step::Finalize
        } else if kind.is_closed() || *self == Step::Start {
            self.next()
        } else {
            Step::Finalize
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// An ordered list of shapes being traced by the stage
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMovementJob {
    /// Instructions; rings are spliced in after their parent at runtime.
    pub instructions: Vec<ShapeInstruction>,
    /// Index of the instruction being traced.
    pub current_item: usize,
    /// Step within the current instruction.
    pub current_step: Step,
    /// Gate the laser along the path.
    pub cut_enabled: bool,
    /// Finish the in-flight move, then finalize and tear down.
    pub stop_requested: bool,
}

impl GroupMovementJob {
    /// Create a job at its first instruction
    pub fn new(instructions: Vec<ShapeInstruction>, cut_enabled: bool) -> Self {
        Self {
            instructions,
            current_item: 0,
            current_step: Step::Start,
            cut_enabled,
            stop_requested: false,
        }
    }

    /// Instruction being traced
    pub fn current(&self) -> Option<&ShapeInstruction> {
        self.instructions.get(self.current_item)
    }

    /// Whether the current instruction is the last one
    pub fn is_last(&self) -> bool {
        self.current_item + 1 >= self.instructions.len()
    }

    /// Whether the next instruction continues the current burn
    pub fn next_is_sub_rect(&self) -> bool {
        self.instructions
            .get(self.current_item + 1)
            .is_some_and(|s| s.kind() == ShapeKind::SubRect)
    }

    /// Insert `rings` right after the current instruction, keeping their order
    pub fn splice_after_current(&mut self, rings: Vec<ShapeInstruction>) {
        let at = (self.current_item + 1).min(self.instructions.len());
        self.instructions.splice(at..at, rings);
    }
}
