//! Group movement engine.
//!
//! Traces a job's shapes as a sequence of two-axis group moves, one step per
//! completed move, gating the laser at instruction boundaries. The engine
//! never waits on hardware: it latches a move and returns, and the
//! controller calls [`GroupMovementEngine::on_move_complete`] once the
//! completion detector has seen the stage settle.

use crate::axis::Axis;
use crate::expander::RingExpander;
use crate::job::{GroupMovementJob, Step};
use microcut_communication::{Laser, StageCommand, Transport};
use microcut_core::{
    AppEvent, ConnectionError, EventBus, JobEvent, LaserError, LaserEvent, LaserStatus,
    MotionError, Point2, ShapeInstruction, ShapeKind,
};
use std::sync::Arc;

/// Upper bound of the group vector velocity
pub const MAX_GROUP_VELOCITY: f64 = 0.4;
/// Upper bound of the group vector acceleration
pub const MAX_GROUP_ACCELERATION: f64 = 1.6;

/// Hardware the engine drives during one call
pub struct Devices<'a> {
    /// Stage controller link.
    pub transport: &'a mut dyn Transport,
    /// Cutting laser, if attached.
    pub laser: Option<&'a mut dyn Laser>,
}

/// Square travel envelope of the grouped axes, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelEnvelope {
    /// Lower bound in mm.
    pub min: f64,
    /// Upper bound in mm.
    pub max: f64,
}

impl TravelEnvelope {
    /// Envelope spanning `min..=max` on both axes
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies inside the envelope
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Error for `point`, if it lies outside
    pub fn check(&self, point: Point2) -> Result<(), MotionError> {
        if self.contains(point.x) && self.contains(point.y) {
            Ok(())
        } else {
            Err(MotionError::OutOfTravelRange {
                x: point.x,
                y: point.y,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for TravelEnvelope {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 12.0,
        }
    }
}

/// What the caller has to do after an engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    /// No job.
    Idle,
    /// A group move was latched; poll until it settles.
    Moving {
        /// A slack take-up move precedes it and the controller withholds
        /// replies until that has settled.
        pre_corrected: bool,
    },
    /// The job ended and the group was torn down.
    Finished {
        /// Instruction count after ring expansion.
        instructions: usize,
        /// Ended early on a stop request.
        stopped: bool,
    },
    /// The job was abandoned; laser off, group torn down.
    Aborted(MotionError),
}

fn link_error(error: ConnectionError) -> MotionError {
    tracing::error!("Stage link failed during group movement: {}", error);
    MotionError::TransportDisconnected
}

/// State machine sequencing group movement jobs
#[derive(Debug)]
pub struct GroupMovementEngine {
    axes: [Axis; 3],
    job: Option<GroupMovementJob>,
    expander: RingExpander,
    envelope: TravelEnvelope,
    group: u8,
    group_active: bool,
    events: Arc<EventBus>,
}

impl GroupMovementEngine {
    /// Create an idle engine; axes 1..3 get the given backlash
    pub fn new(
        backlash: [f64; 3],
        expander: RingExpander,
        envelope: TravelEnvelope,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            axes: [
                Axis::new(1, backlash[0]),
                Axis::new(2, backlash[1]),
                Axis::new(3, backlash[2]),
            ],
            job: None,
            expander,
            envelope,
            group: 1,
            group_active: false,
            events,
        }
    }

    /// All three axes
    pub fn axes(&self) -> &[Axis; 3] {
        &self.axes
    }

    /// All three axes, mutably
    pub fn axes_mut(&mut self) -> &mut [Axis; 3] {
        &mut self.axes
    }

    /// Travel envelope
    pub fn envelope(&self) -> TravelEnvelope {
        self.envelope
    }

    /// Active job, if any
    pub fn job(&self) -> Option<&GroupMovementJob> {
        self.job.as_ref()
    }

    /// Whether a job is running
    pub fn is_active(&self) -> bool {
        self.job.is_some()
    }

    /// Whether the hardware group is defined
    pub fn group_active(&self) -> bool {
        self.group_active
    }

    /// Hardware group number
    pub fn group(&self) -> u8 {
        self.group
    }

    /// Define the two-axis group over axes 1 and 2
    pub fn define_group(
        &mut self,
        velocity: f64,
        acceleration: f64,
        transport: &mut dyn Transport,
    ) -> Result<(), MotionError> {
        if !(velocity > 0.0 && velocity <= MAX_GROUP_VELOCITY) {
            return Err(MotionError::InvalidParameter {
                name: "group velocity",
                value: velocity,
                range: "0 < v <= 0.4",
            });
        }
        if !(acceleration > 0.0 && acceleration <= MAX_GROUP_ACCELERATION) {
            return Err(MotionError::InvalidParameter {
                name: "group acceleration",
                value: acceleration,
                range: "0 < a <= 1.6",
            });
        }
        transport
            .send_sync(&StageCommand::DefineGroup {
                group: self.group,
                axes: (1, 2),
                velocity,
                acceleration,
                deceleration: acceleration,
            })
            .map_err(link_error)?;
        self.group_active = true;
        Ok(())
    }

    /// Delete the hardware group; failures are logged, not returned
    pub fn break_group(&mut self, transport: &mut dyn Transport) {
        self.group_active = false;
        if let Err(e) = transport.send_sync(&StageCommand::GroupBreak { group: self.group }) {
            tracing::warn!("Could not break group {}: {}", self.group, e);
        }
    }

    /// Define the group and start tracing `instructions`
    pub fn start(
        &mut self,
        instructions: Vec<ShapeInstruction>,
        cut_enabled: bool,
        velocity: f64,
        acceleration: f64,
        io: &mut Devices<'_>,
    ) -> Result<EngineOutcome, MotionError> {
        if self.job.is_some() {
            return Err(MotionError::JobAlreadyActive);
        }
        if instructions.is_empty() {
            return Err(MotionError::EmptyJob);
        }
        self.define_group(velocity, acceleration, io.transport)?;
        tracing::info!(
            "Starting group movement: {} instructions, cut {}",
            instructions.len(),
            cut_enabled
        );
        self.job = Some(GroupMovementJob::new(instructions, cut_enabled));
        Ok(self.advance(io))
    }

    /// Finish the in-flight move, then finalize; returns false without a job
    pub fn request_stop(&mut self) -> bool {
        match self.job.as_mut() {
            Some(job) => {
                job.stop_requested = true;
                tracing::info!("Stop requested at item {}", job.current_item);
                true
            }
            None => false,
        }
    }

    /// The latched move has settled: adopt the final positions and advance
    pub fn on_move_complete(&mut self, io: &mut Devices<'_>) -> EngineOutcome {
        let Some(job) = self.job.as_mut() else {
            return EngineOutcome::Idle;
        };
        for axis in self.axes[..2].iter_mut() {
            axis.settle(axis.raw_motor_position);
        }
        let kind = job.current().map_or(ShapeKind::Line, |s| s.kind());
        job.current_step = job.current_step.after_move(kind, job.stop_requested);
        self.advance(io)
    }

    /// Abandon the job: laser off if cutting, group torn down
    pub fn abort(&mut self, reason: MotionError, io: &mut Devices<'_>) -> EngineOutcome {
        tracing::error!("Aborting group movement: {}", reason);
        if let Some(job) = self.job.take() {
            if job.cut_enabled {
                self.laser_off(io);
            }
        }
        self.break_group(io.transport);
        EngineOutcome::Aborted(reason)
    }

    /// Run steps until a move is latched or the job ends
    pub fn advance(&mut self, io: &mut Devices<'_>) -> EngineOutcome {
        loop {
            if self.job.is_none() {
                return EngineOutcome::Idle;
            }
            if !io.transport.is_connected() {
                return self.abort(MotionError::TransportDisconnected, io);
            }
            let Some(job) = self.job.as_mut() else {
                return EngineOutcome::Idle;
            };
            let Some(shape) = job.current().cloned() else {
                return self.finish(io);
            };
            let step = job.current_step;
            let item = job.current_item;
            self.publish(AppEvent::Job(JobEvent::StepChanged {
                item,
                step: step.index(),
            }));

            let latched = match (shape.kind(), step) {
                (_, Step::Start) => self.start_instruction(&shape, io),
                (_, Step::FirstEdge) => {
                    self.laser_on(io);
                    self.move_to_path_point(&shape, 1, io)
                }
                (ShapeKind::Line, _) if step != Step::Finalize => {
                    self.set_step(Step::Finalize);
                    continue;
                }
                (_, Step::SecondEdge) => self.move_to_path_point(&shape, 2, io),
                (_, Step::ThirdEdge) => self.move_to_path_point(&shape, 3, io),
                (_, Step::ClosePath) => self.move_to_path_point(&shape, 4, io),
                (_, Step::Finalize) => match self.finalize(io) {
                    Some(outcome) => return outcome,
                    None => continue,
                },
            };

            return match latched {
                Ok(pre_corrected) => EngineOutcome::Moving { pre_corrected },
                Err(e) => self.abort(e, io),
            };
        }
    }

    fn set_step(&mut self, step: Step) {
        if let Some(job) = self.job.as_mut() {
            job.current_step = step;
        }
    }

    fn start_instruction(
        &mut self,
        shape: &ShapeInstruction,
        io: &mut Devices<'_>,
    ) -> Result<bool, MotionError> {
        for point in shape.points() {
            self.envelope.check(point)?;
        }
        // Rings are only spliced in when the widest of them fits
        if let Some(outer) = self.expander.outermost_ring(shape) {
            for point in outer {
                self.envelope.check(point)?;
            }
        }

        let Some(job) = self.job.as_mut() else {
            return Ok(false);
        };
        let first_cut = job.current_item == 0 && job.cut_enabled;

        let rings = self.expander.expand(shape);
        if !rings.is_empty() {
            tracing::info!("Expanding {} into {} rings", shape.kind(), rings.len());
            job.splice_after_current(rings);
        }

        if first_cut {
            if let Some(laser) = io.laser.as_deref_mut() {
                if laser.status() == LaserStatus::On {
                    tracing::warn!("Laser was emitting before the job started, switching off");
                    self.laser_off(io);
                }
            }
        }

        self.group_move(shape.start(), io)
    }

    fn move_to_path_point(
        &mut self,
        shape: &ShapeInstruction,
        index: usize,
        io: &mut Devices<'_>,
    ) -> Result<bool, MotionError> {
        match shape.path_point(index) {
            Some(point) => self.group_move(point, io),
            None => Err(MotionError::InvalidParameter {
                name: "path point",
                value: index as f64,
                range: "0..=4",
            }),
        }
    }

    /// Latch a backlash-compensated group move to `target`.
    ///
    /// When either axis reverses, the slack is taken up first with a move to
    /// the current raw position plus one backlash increment on the reversing
    /// axes, followed by a group wait. Returns whether that happened.
    fn group_move(&mut self, target: Point2, io: &mut Devices<'_>) -> Result<bool, MotionError> {
        self.envelope.check(target)?;

        let tx = self.axes[0].compute_target(target.x);
        let ty = self.axes[1].compute_target(target.y);
        let pre_corrected = tx.causes_relative_pre_move || ty.causes_relative_pre_move;

        if pre_corrected {
            let cx = if tx.causes_relative_pre_move {
                self.axes[0].pre_move_target()
            } else {
                self.axes[0].raw_motor_position
            };
            let cy = if ty.causes_relative_pre_move {
                self.axes[1].pre_move_target()
            } else {
                self.axes[1].raw_motor_position
            };
            tracing::debug!("Taking up slack at ({}, {})", cx, cy);
            io.transport
                .send_async(&StageCommand::GroupLatch {
                    group: self.group,
                    x: cx,
                    y: cy,
                })
                .map_err(link_error)?;
            io.transport
                .send_async(&StageCommand::GroupWaitStop {
                    group: self.group,
                    delay_ms: 0,
                })
                .map_err(link_error)?;
        }

        tracing::debug!(
            "Group move to {} (sent ({}, {}))",
            target,
            tx.send_value,
            ty.send_value
        );
        io.transport
            .send_async(&StageCommand::GroupLatch {
                group: self.group,
                x: tx.send_value,
                y: ty.send_value,
            })
            .map_err(link_error)?;
        Ok(pre_corrected)
    }

    /// Returns the outcome when the job ends here, `None` to continue with
    /// the next instruction.
    fn finalize(&mut self, io: &mut Devices<'_>) -> Option<EngineOutcome> {
        let job = self.job.as_ref()?;
        let stop = job.stop_requested;
        let beam_off = job.cut_enabled && (stop || !job.next_is_sub_rect());
        let last = job.is_last();

        if beam_off {
            self.laser_off(io);
        }
        if last || stop {
            return Some(self.finish(io));
        }

        if let Some(job) = self.job.as_mut() {
            job.current_item += 1;
            job.current_step = Step::Start;
        }
        None
    }

    fn finish(&mut self, io: &mut Devices<'_>) -> EngineOutcome {
        let job = self.job.take();
        self.break_group(io.transport);
        let (instructions, stopped) = job
            .map(|j| (j.instructions.len(), j.stop_requested))
            .unwrap_or((0, false));
        tracing::info!(
            "Group movement {} after {} instructions",
            if stopped { "stopped" } else { "finished" },
            instructions
        );
        EngineOutcome::Finished {
            instructions,
            stopped,
        }
    }

    fn laser_on(&mut self, io: &mut Devices<'_>) {
        if !self.job.as_ref().is_some_and(|j| j.cut_enabled) {
            return;
        }
        let Some(laser) = io.laser.as_deref_mut() else {
            tracing::warn!("Cutting requested but no laser attached");
            return;
        };
        let status = laser.status();
        if status == LaserStatus::On {
            // Carried over from the previous ring
            return;
        }
        if status != LaserStatus::Ready {
            let e = LaserError::NotReady {
                status: status.to_string(),
            };
            tracing::warn!("{}, continuing without beam", e);
            return;
        }
        match laser.turn_on() {
            Ok(()) => self.publish(AppEvent::Laser(LaserEvent::EmissionChanged { on: true })),
            Err(e) => tracing::warn!("Laser did not switch on: {}", e),
        }
    }

    fn laser_off(&mut self, io: &mut Devices<'_>) {
        let Some(laser) = io.laser.as_deref_mut() else {
            return;
        };
        match laser.turn_off() {
            Ok(()) => self.publish(AppEvent::Laser(LaserEvent::EmissionChanged { on: false })),
            Err(e) => tracing::error!("Laser did not switch off: {}", e),
        }
    }

    fn publish(&self, event: AppEvent) {
        let _ = self.events.publish(event);
    }
}
