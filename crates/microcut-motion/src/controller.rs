//! Motion controller.
//!
//! Owns the axis models, the group movement engine and the completion
//! detector, and is the only place that talks to the stage. All state
//! changes happen either in an explicit command method or in [`tick`],
//! which the runner calls at a fixed period.
//!
//! [`tick`]: MotionController::tick

use crate::axis::Axis;
use crate::detector::{DetectorEvent, DetectorMode, MotionCompletionDetector, PositionSample};
use crate::engine::{Devices, EngineOutcome, GroupMovementEngine, TravelEnvelope};
use crate::expander::RingExpander;
use microcut_communication::{
    decode_status, last_line, Laser, SharedLaser, SharedTransport, StageCommand, StageStatus,
};
use microcut_core::{
    AppEvent, ConnectionError, ConnectionEvent, ControllerStatus, EventBus, JobEvent, MotionError,
    MotionEvent, Point2, Point3, ShapeInstruction,
};
use std::sync::Arc;

/// Upper bound of the single-axis velocity
pub const MAX_AXIS_VELOCITY: f64 = 0.4;
/// Upper bound of the single-axis acceleration
pub const MAX_AXIS_ACCELERATION: f64 = 1.8;
/// Length of each leg of the direction-establishing move
const DIRECTION_PROBE: f64 = 0.02;
/// Number of stage axes
const AXIS_COUNT: u8 = 3;

/// Motion tuning, usually mapped from the settings file
#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    /// Backlash of axes 1..3 in mm.
    pub backlash: [f64; 3],
    /// Group vector velocity in mm/s.
    pub group_velocity: f64,
    /// Group vector acceleration and deceleration in mm/s².
    pub group_acceleration: f64,
    /// Travel envelope of the grouped axes.
    pub envelope: TravelEnvelope,
    /// Completion fires once the unchanged counter exceeds this.
    pub stable_threshold: u32,
    /// Consecutive empty polls tolerated; `None` polls forever.
    pub max_silent_polls: Option<u32>,
    /// Laser spot width in mm.
    pub spot_width: f64,
    /// Camera pixel pitch in mm/px.
    pub pixel_pitch: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            backlash: [0.012, 0.009, 0.0],
            group_velocity: 0.2,
            group_acceleration: 0.8,
            envelope: TravelEnvelope::default(),
            stable_threshold: 2,
            max_silent_polls: None,
            spot_width: 0.001,
            pixel_pitch: 0.000089,
        }
    }
}

/// Stage controller front end
pub struct MotionController {
    transport: SharedTransport,
    laser: Option<SharedLaser>,
    engine: GroupMovementEngine,
    detector: MotionCompletionDetector,
    status: ControllerStatus,
    joystick_mode: bool,
    directions_known: bool,
    velocity: f64,
    acceleration: f64,
    config: MotionConfig,
    events: Arc<EventBus>,
}

impl std::fmt::Debug for MotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionController")
            .field("status", &self.status)
            .field("engine", &self.engine)
            .field("detector", &self.detector)
            .field("joystick_mode", &self.joystick_mode)
            .field("has_laser", &self.laser.is_some())
            .finish()
    }
}

impl MotionController {
    /// Create a controller over an open transport
    pub fn new(
        transport: SharedTransport,
        laser: Option<SharedLaser>,
        config: MotionConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let engine = GroupMovementEngine::new(
            config.backlash,
            RingExpander::new(config.spot_width, config.pixel_pitch),
            config.envelope,
            Arc::clone(&events),
        );
        let detector =
            MotionCompletionDetector::new(config.stable_threshold, config.max_silent_polls);
        Self {
            transport,
            laser,
            engine,
            detector,
            status: ControllerStatus::Disconnected,
            joystick_mode: false,
            directions_known: false,
            velocity: 0.0,
            acceleration: 0.0,
            config,
            events,
        }
    }

    /// Last classified controller status
    pub fn status(&self) -> ControllerStatus {
        self.status
    }

    /// Motion settings in use
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Group movement engine
    pub fn engine(&self) -> &GroupMovementEngine {
        &self.engine
    }

    /// Completion detector
    pub fn detector(&self) -> &MotionCompletionDetector {
        &self.detector
    }

    /// Model of `axis` (1-based)
    pub fn axis(&self, axis: u8) -> Result<&Axis, MotionError> {
        let i = Self::axis_index(axis)?;
        Ok(&self.engine.axes()[i])
    }

    /// Logical position of all three axes
    pub fn logical_position(&self) -> Point3 {
        let axes = self.engine.axes();
        Point3::new(
            axes[0].logical_position,
            axes[1].logical_position,
            axes[2].logical_position,
        )
    }

    /// Axis velocity last read back from the controller
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Axis acceleration last read back from the controller
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Whether joystick mode is engaged
    pub fn joystick_mode(&self) -> bool {
        self.joystick_mode
    }

    /// Whether the last direction of axes 1 and 2 is trusted
    pub fn directions_known(&self) -> bool {
        self.directions_known
    }

    /// Whether a group movement job is running
    pub fn job_active(&self) -> bool {
        self.engine.is_active()
    }

    /// Nothing is running and nothing is being watched
    pub fn is_idle(&self) -> bool {
        !self.engine.is_active() && !self.detector.is_armed()
    }

    fn axis_index(axis: u8) -> Result<usize, MotionError> {
        if (1..=AXIS_COUNT).contains(&axis) {
            Ok(usize::from(axis - 1))
        } else {
            Err(MotionError::InvalidAxis { axis })
        }
    }

    fn publish(&self, event: AppEvent) {
        let _ = self.events.publish(event);
    }

    fn publish_position(&self) {
        self.publish(AppEvent::Motion(MotionEvent::PositionUpdated {
            position: self.logical_position(),
        }));
    }

    fn set_status(&mut self, status: ControllerStatus) {
        if status != self.status {
            tracing::debug!("Controller status {} -> {}", self.status, status);
            self.publish(AppEvent::Motion(MotionEvent::StatusChanged {
                old: self.status,
                new: status,
            }));
            self.status = status;
        }
    }

    fn send_sync(&self, command: &StageCommand) -> Result<String, MotionError> {
        let mut transport = self.transport.lock();
        if !transport.is_connected() {
            return Err(MotionError::NotConnected);
        }
        tracing::debug!("-> {}", command);
        let reply = transport.send_sync(command).map_err(|e| {
            tracing::warn!("'{}' failed: {}", command, e);
            MotionError::TransportDisconnected
        })?;
        tracing::debug!("<- {:?}", reply);
        Ok(reply)
    }

    fn send_async(&self, command: &StageCommand) -> Result<(), MotionError> {
        let mut transport = self.transport.lock();
        if !transport.is_connected() {
            return Err(MotionError::NotConnected);
        }
        tracing::debug!("-> {}", command);
        transport.send_async(command).map_err(|e| {
            tracing::warn!("'{}' failed: {}", command, e);
            MotionError::TransportDisconnected
        })
    }

    fn query_number(&self, command: &StageCommand) -> Result<f64, MotionError> {
        let reply = self.send_sync(command)?;
        last_line(&reply)
            .parse::<f64>()
            .map_err(|_| MotionError::UnexpectedReply {
                command: command.to_string(),
                reply: reply.clone(),
            })
    }

    /// Run `f` against the engine with the devices locked for its duration
    fn drive<R>(&mut self, f: impl FnOnce(&mut GroupMovementEngine, &mut Devices<'_>) -> R) -> R {
        let transport = Arc::clone(&self.transport);
        let laser = self.laser.clone();
        let mut transport_guard = transport.lock();
        let mut laser_guard = laser.as_ref().map(|l| l.lock());
        let mut devices = Devices {
            transport: &mut *transport_guard,
            laser: laser_guard.as_mut().map(|g| &mut **g as &mut dyn Laser),
        };
        f(&mut self.engine, &mut devices)
    }

    /// Query the status byte and reclassify the controller.
    ///
    /// On `Ready` all positions are re-read and published; on motion the
    /// detector is armed for the moving axis or the group.
    pub fn update_status(&mut self) -> Result<ControllerStatus, MotionError> {
        let reply = self.send_sync(&StageCommand::Status)?;
        let Some(stage) = decode_status(&reply) else {
            self.set_status(ControllerStatus::Disconnected);
            if self.engine.is_active() {
                return Err(self.link_failure(MotionError::UnexpectedReply {
                    command: StageCommand::Status.to_string(),
                    reply,
                }));
            }
            return Ok(self.status);
        };

        let status = self.classify(&stage);
        self.set_status(status);

        match status {
            ControllerStatus::Ready => {
                self.refresh_positions()?;
                self.publish_position();
            }
            ControllerStatus::Moving => {
                if let Some(axis) = stage.moving_axes.first() {
                    self.watch(DetectorMode::Axis(*axis))?;
                }
            }
            ControllerStatus::GroupMoving => {
                let group = self.engine.group();
                self.watch(DetectorMode::Group(group))?;
            }
            ControllerStatus::Off => {
                if self.engine.is_active() {
                    let outcome = self.drive(|engine, io| engine.abort(MotionError::MotorsOff, io));
                    self.handle_outcome(outcome)?;
                }
            }
            ControllerStatus::Disconnected => {}
        }
        Ok(self.status)
    }

    fn classify(&self, stage: &StageStatus) -> ControllerStatus {
        let group = self.engine.group_active();
        let waiting = self.detector.waiting_for_group_finish();
        let moving = stage.moving_axes.len();

        if !stage.motor_power_on && !waiting {
            ControllerStatus::Off
        } else if stage.motor_power_on && moving == 0 && !group && !self.joystick_mode {
            ControllerStatus::Ready
        } else if moving >= 2 || group || self.joystick_mode {
            ControllerStatus::GroupMoving
        } else if moving == 1 {
            ControllerStatus::Moving
        } else {
            self.status
        }
    }

    fn watch(&mut self, mode: DetectorMode) -> Result<(), MotionError> {
        self.detector.arm(mode, "");
        self.send_async(&mode.query())
    }

    /// Re-read all three axes and adopt the readings as rest positions
    pub fn refresh_positions(&mut self) -> Result<Point3, MotionError> {
        for axis in 1..=AXIS_COUNT {
            self.position(axis)?;
        }
        Ok(self.logical_position())
    }

    /// Read `axis` and return its logical position
    pub fn position(&mut self, axis: u8) -> Result<f64, MotionError> {
        let i = Self::axis_index(axis)?;
        let raw = self.query_number(&StageCommand::QueryPosition { axis })?;
        let model = &mut self.engine.axes_mut()[i];
        model.settle(raw);
        Ok(model.logical_position)
    }

    fn check_axis_target(&self, axis: u8, target: f64) -> Result<(), MotionError> {
        let envelope = self.config.envelope;
        if envelope.contains(target) {
            Ok(())
        } else {
            Err(MotionError::AxisOutOfRange {
                axis,
                target,
                min: envelope.min,
                max: envelope.max,
            })
        }
    }

    /// Move `axis` to the logical position `position`
    pub fn set_abs_position(&mut self, axis: u8, position: f64) -> Result<(), MotionError> {
        let i = Self::axis_index(axis)?;
        self.check_axis_target(axis, position)?;
        let target = self.engine.axes_mut()[i].compute_target(position);
        self.send_async(&StageCommand::MoveAbsolute {
            axis,
            position: target.send_value,
        })?;
        self.update_status()?;
        Ok(())
    }

    /// Move `axis` by `distance` from its current raw position
    pub fn set_rel_position(&mut self, axis: u8, distance: f64) -> Result<(), MotionError> {
        let i = Self::axis_index(axis)?;
        let raw = self.query_number(&StageCommand::QueryPosition { axis })?;
        self.engine.axes_mut()[i].raw_motor_position = raw;
        self.check_axis_target(axis, raw + distance)?;
        self.send_async(&StageCommand::MoveRelative { axis, distance })?;
        self.update_status()?;
        Ok(())
    }

    /// Set the velocity of axes 1 and 2; returns the value read back
    pub fn set_velocity(&mut self, velocity: f64) -> Result<f64, MotionError> {
        if !(velocity > 0.0 && velocity <= MAX_AXIS_VELOCITY) {
            return Err(MotionError::InvalidParameter {
                name: "velocity",
                value: velocity,
                range: "0 < v <= 0.4",
            });
        }
        self.send_sync(&StageCommand::SetVelocity {
            axes: vec![1, 2],
            value: velocity,
        })?;
        self.velocity = self.query_number(&StageCommand::QueryVelocity { axis: 1 })?;
        Ok(self.velocity)
    }

    /// Set the acceleration of axes 1 and 2; returns the value read back
    pub fn set_acceleration(&mut self, acceleration: f64) -> Result<f64, MotionError> {
        if !(acceleration > 0.0 && acceleration <= MAX_AXIS_ACCELERATION) {
            return Err(MotionError::InvalidParameter {
                name: "acceleration",
                value: acceleration,
                range: "0 < a <= 1.8",
            });
        }
        self.send_sync(&StageCommand::SetAcceleration {
            axes: vec![1, 2],
            value: acceleration,
        })?;
        self.acceleration = self.query_number(&StageCommand::QueryAcceleration { axis: 1 })?;
        Ok(self.acceleration)
    }

    /// Search the home switch of `axis`
    pub fn go_home(&mut self, axis: u8) -> Result<(), MotionError> {
        Self::axis_index(axis)?;
        self.send_async(&StageCommand::Home { axis })?;
        self.update_status()?;
        Ok(())
    }

    /// Decelerate `axis` to a stop
    pub fn stop_axis(&mut self, axis: u8) -> Result<(), MotionError> {
        Self::axis_index(axis)?;
        self.send_sync(&StageCommand::StopAxis { axis })?;
        self.update_status()?;
        Ok(())
    }

    /// Emergency stop: all axes halt and the motors are flagged off.
    ///
    /// A running job is aborted with the laser switched off.
    pub fn abort_motion(&mut self) -> Result<(), MotionError> {
        self.send_sync(&StageCommand::AbortMotion)?;
        self.detector.disarm();
        if self.engine.is_active() {
            let outcome = self.drive(|engine, io| engine.abort(MotionError::MotorsOff, io));
            let _ = self.handle_outcome(outcome);
        }
        self.update_status()?;
        Ok(())
    }

    fn check_axes(axes: &[u8]) -> Result<(), MotionError> {
        axes.iter().try_for_each(|a| Self::axis_index(*a).map(|_| ()))
    }

    /// Power the motors of `axes`
    pub fn motor_on(&mut self, axes: &[u8]) -> Result<(), MotionError> {
        Self::check_axes(axes)?;
        self.send_sync(&StageCommand::MotorOn {
            axes: axes.to_vec(),
        })?;
        self.update_status()?;
        Ok(())
    }

    /// Unpower the motors of `axes`
    pub fn motor_off(&mut self, axes: &[u8]) -> Result<(), MotionError> {
        Self::check_axes(axes)?;
        self.send_sync(&StageCommand::MotorOff {
            axes: axes.to_vec(),
        })?;
        self.update_status()?;
        Ok(())
    }

    /// Hand the stage to the joystick
    pub fn enter_joystick_mode(&mut self) -> Result<(), MotionError> {
        self.send_sync(&StageCommand::JoystickMode)?;
        self.joystick_mode = true;
        self.directions_known = false;
        self.update_status()?;
        Ok(())
    }

    /// Take the stage back from the joystick.
    ///
    /// The joystick leaves the backlash state unknown, so both grouped axes
    /// are re-read and their directions re-established.
    pub fn enter_command_mode(&mut self) -> Result<(), MotionError> {
        self.send_sync(&StageCommand::CommandMode)?;
        self.joystick_mode = false;
        self.position(1)?;
        self.position(2)?;
        self.establish_directions()?;
        if !self.engine.is_active() {
            self.update_status()?;
        }
        Ok(())
    }

    /// Run a short laser-less diagonal so axes 1 and 2 both end with a
    /// known negative direction.
    ///
    /// Skipped when the directions are already known or the probe would
    /// leave the envelope. The probe is a regular job; tick until idle.
    pub fn establish_directions(&mut self) -> Result<(), MotionError> {
        if self.directions_known {
            return Ok(());
        }
        let start = self.logical_position().xy();
        let end = Point2::new(start.x - DIRECTION_PROBE, start.y - DIRECTION_PROBE);
        if self.config.envelope.check(end).is_err() || self.config.envelope.check(start).is_err() {
            tracing::warn!("Cannot establish axis directions from {}", start);
            return Ok(());
        }
        self.perform(vec![ShapeInstruction::Line { start, end }], false)?;
        // Cleared again if the probe job aborts
        self.directions_known = true;
        Ok(())
    }

    /// Connection-time setup: read state, power the motors, clear any
    /// stale group and enter command mode
    pub fn initialize(&mut self) -> Result<(), MotionError> {
        self.refresh_positions()?;
        self.velocity = self.query_number(&StageCommand::QueryVelocity { axis: 1 })?;
        self.acceleration = self.query_number(&StageCommand::QueryAcceleration { axis: 1 })?;
        tracing::info!(
            "Stage at {}, velocity {}, acceleration {}",
            self.logical_position(),
            self.velocity,
            self.acceleration
        );
        self.send_sync(&StageCommand::MotorOn {
            axes: (1..=AXIS_COUNT).collect(),
        })?;
        self.drive(|engine, io| engine.break_group(io.transport));
        self.enter_command_mode()?;
        let port = self.transport.lock().name();
        self.publish(AppEvent::Connection(ConnectionEvent::Connected { port }));
        Ok(())
    }

    /// Pass `text` to the controller unchanged and return its reply
    pub fn send_raw(&mut self, text: &str) -> Result<String, MotionError> {
        self.send_sync(&StageCommand::Raw(text.to_string()))
    }

    /// Start tracing `instructions` as one group movement job
    pub fn perform(
        &mut self,
        instructions: Vec<ShapeInstruction>,
        cut_enabled: bool,
    ) -> Result<(), MotionError> {
        if !self.transport.lock().is_connected() {
            return Err(MotionError::NotConnected);
        }
        if self.engine.is_active() {
            return Err(MotionError::JobAlreadyActive);
        }
        if instructions.is_empty() {
            return Err(MotionError::EmptyJob);
        }

        self.publish(AppEvent::Job(JobEvent::Started {
            instructions: instructions.len(),
            cut_enabled,
        }));
        let velocity = self.config.group_velocity;
        let acceleration = self.config.group_acceleration;
        let started = self.drive(|engine, io| {
            engine.start(instructions, cut_enabled, velocity, acceleration, io)
        });
        match started {
            Ok(outcome) => self.handle_outcome(outcome),
            Err(e) => {
                self.publish(AppEvent::Job(JobEvent::Aborted {
                    reason: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    /// Finish the current move, then end the job; false without a job
    pub fn request_stop(&mut self) -> bool {
        self.engine.request_stop()
    }

    fn handle_outcome(&mut self, outcome: EngineOutcome) -> Result<(), MotionError> {
        match outcome {
            EngineOutcome::Idle => Ok(()),
            EngineOutcome::Moving { pre_corrected } => {
                if pre_corrected {
                    self.detector.set_waiting_for_group_finish(true);
                }
                match self.update_status() {
                    Ok(_) => Ok(()),
                    Err(MotionError::TransportDisconnected) => {
                        Err(self.link_failure(MotionError::TransportDisconnected))
                    }
                    Err(e) => Err(e),
                }
            }
            EngineOutcome::Finished {
                instructions,
                stopped,
            } => {
                self.detector.disarm();
                self.publish(AppEvent::Job(JobEvent::Finished {
                    instructions,
                    stopped,
                }));
                self.update_status()?;
                Ok(())
            }
            EngineOutcome::Aborted(reason) => {
                self.detector.disarm();
                // An interrupted move leaves the slack on either side
                self.directions_known = false;
                self.publish(AppEvent::Job(JobEvent::Aborted {
                    reason: reason.to_string(),
                }));
                Err(reason)
            }
        }
    }

    /// Tear down after the link failed; returns `reason` for propagation
    fn link_failure(&mut self, reason: MotionError) -> MotionError {
        tracing::error!("Stage link failed: {}", reason);
        if self.engine.is_active() {
            let abort_reason = reason.clone();
            let outcome = self.drive(|engine, io| engine.abort(abort_reason, io));
            let _ = self.handle_outcome(outcome);
        }
        self.detector.disarm();
        self.directions_known = false;
        self.set_status(ControllerStatus::Disconnected);
        let port = self.transport.lock().name();
        self.publish(AppEvent::Connection(ConnectionEvent::Disconnected {
            port,
            reason: reason.to_string(),
        }));
        reason
    }

    fn apply_sample(&mut self, sample: PositionSample) {
        let axes = self.engine.axes_mut();
        let changed = match sample {
            PositionSample::Axis { axis, value } => match Self::axis_index(axis) {
                Ok(i) => axes[i].apply_raw_sample(value),
                Err(_) => false,
            },
            PositionSample::Group { x, y } => {
                let moved_x = axes[0].apply_raw_sample(x);
                let moved_y = axes[1].apply_raw_sample(y);
                moved_x || moved_y
            }
        };
        if changed {
            self.publish_position();
        }
    }

    /// One polling period: collect the pending reply, feed the detector
    /// and act on what it decides
    pub fn tick(&mut self) -> Result<(), MotionError> {
        if !self.detector.is_armed() {
            return Ok(());
        }

        let polled = {
            let mut transport = self.transport.lock();
            if transport.is_connected() {
                transport.poll_response()
            } else {
                Err(ConnectionError::NotConnected)
            }
        };
        let reply = match polled {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Polling failed: {}", e);
                return Err(self.link_failure(MotionError::TransportDisconnected));
            }
        };

        match self.detector.observe(reply.as_deref()) {
            DetectorEvent::Idle => Ok(()),
            DetectorEvent::NoResponse => self.requery(),
            DetectorEvent::Moving(sample) => {
                if let Some(sample) = sample {
                    self.apply_sample(sample);
                }
                self.requery()
            }
            DetectorEvent::Complete => {
                if self.engine.is_active() {
                    let outcome = self.drive(|engine, io| engine.on_move_complete(io));
                    self.handle_outcome(outcome)
                } else {
                    self.update_status().map(|_| ())
                }
            }
            DetectorEvent::Stalled { polls } => {
                Err(self.link_failure(MotionError::Stalled { polls }))
            }
        }
    }

    fn requery(&mut self) -> Result<(), MotionError> {
        let Some(query) = self.detector.query() else {
            return Ok(());
        };
        match self.send_async(&query) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.link_failure(e)),
        }
    }
}
