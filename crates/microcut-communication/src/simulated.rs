//! In-memory stage controller.
//!
//! Models just enough of the controller for the motion engine to run end to
//! end without hardware: axes travel a fixed distance per position query,
//! the status byte reflects power and motion, and after a group wait the
//! next poll comes back empty, as the real controller does while it holds
//! its command queue.

use crate::command::{format_value, StageCommand};
use crate::status::StageStatus;
use crate::transport::Transport;
use microcut_core::ConnectionError;
use std::collections::VecDeque;

const AXES: usize = 3;

/// Simulated stage controller
#[derive(Debug, Clone)]
pub struct SimulatedStage {
    positions: [f64; AXES],
    targets: [f64; AXES],
    step: f64,
    motor_power: bool,
    group_axes: Option<(u8, u8)>,
    velocity: f64,
    acceleration: f64,
    responses: VecDeque<String>,
    withheld_polls: u32,
    silent: bool,
    connected: bool,
    sent: Vec<StageCommand>,
}

impl SimulatedStage {
    /// Create a stage at `position` (axes 1..3), powered on
    pub fn new(position: [f64; AXES]) -> Self {
        Self {
            positions: position,
            targets: position,
            step: 0.25,
            motor_power: true,
            group_axes: None,
            velocity: 0.2,
            acceleration: 0.8,
            responses: VecDeque::new(),
            withheld_polls: 0,
            silent: false,
            connected: true,
            sent: Vec::new(),
        }
    }

    /// Distance every axis travels per position query
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step.abs().max(1e-6);
        self
    }

    /// Raw position of `axis` (1-based)
    pub fn position(&self, axis: u8) -> f64 {
        self.positions[usize::from(axis.clamp(1, AXES as u8) - 1)]
    }

    /// Every command received so far, oldest first
    pub fn sent(&self) -> &[StageCommand] {
        &self.sent
    }

    /// Forget the command log
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Whether a group is defined
    pub fn has_group(&self) -> bool {
        self.group_axes.is_some()
    }

    /// Stop answering anything (a hung controller)
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Drop the link
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.responses.clear();
    }

    fn index(axis: u8) -> Option<usize> {
        (1..=AXES as u8).contains(&axis).then(|| usize::from(axis - 1))
    }

    fn is_moving(&self, i: usize) -> bool {
        (self.positions[i] - self.targets[i]).abs() > 1e-9
    }

    fn status(&self) -> StageStatus {
        StageStatus {
            motor_power_on: self.motor_power,
            moving_axes: (0..AXES)
                .filter(|i| self.is_moving(*i))
                .map(|i| i as u8 + 1)
                .collect(),
        }
    }

    fn advance(&mut self) {
        if !self.motor_power {
            return;
        }
        for i in 0..AXES {
            let delta = self.targets[i] - self.positions[i];
            if delta.abs() <= self.step {
                self.positions[i] = self.targets[i];
            } else {
                self.positions[i] += self.step * delta.signum();
            }
        }
    }

    fn set_target(&mut self, axis: u8, target: f64) {
        if let Some(i) = Self::index(axis) {
            self.targets[i] = target;
        }
    }

    /// Apply `command` and produce the controller's answer, if any
    fn execute(&mut self, command: &StageCommand) -> Option<String> {
        self.sent.push(command.clone());
        if self.silent {
            return None;
        }

        match command {
            StageCommand::MoveAbsolute { axis, position } => {
                self.set_target(*axis, *position);
                None
            }
            StageCommand::MoveRelative { axis, distance } => {
                if let Some(i) = Self::index(*axis) {
                    self.targets[i] = self.positions[i] + distance;
                }
                None
            }
            StageCommand::QueryPosition { axis } => {
                self.advance();
                Self::index(*axis).map(|i| format_value(self.positions[i]))
            }
            StageCommand::SetVelocity { value, .. } => {
                self.velocity = *value;
                None
            }
            StageCommand::QueryVelocity { .. } => Some(format_value(self.velocity)),
            StageCommand::SetAcceleration { value, .. } => {
                self.acceleration = *value;
                None
            }
            StageCommand::QueryAcceleration { .. } => Some(format_value(self.acceleration)),
            StageCommand::Home { axis } => {
                self.set_target(*axis, 0.0);
                None
            }
            StageCommand::StopAxis { axis } => {
                if let Some(i) = Self::index(*axis) {
                    self.targets[i] = self.positions[i];
                }
                None
            }
            StageCommand::AbortMotion => {
                self.targets = self.positions;
                self.motor_power = false;
                None
            }
            StageCommand::MotorOn { .. } => {
                self.motor_power = true;
                None
            }
            StageCommand::MotorOff { .. } => {
                self.motor_power = false;
                None
            }
            StageCommand::Status => {
                if self.withheld_polls > 0 {
                    return Some(String::new());
                }
                char::from_u32(0x40 | self.status().to_byte()).map(String::from)
            }
            StageCommand::DefineGroup { axes, .. } => {
                self.group_axes = Some(*axes);
                None
            }
            StageCommand::GroupLatch { x, y, .. } => {
                if let Some((a, b)) = self.group_axes {
                    self.set_target(a, *x);
                    self.set_target(b, *y);
                }
                None
            }
            StageCommand::GroupWaitStop { .. } => {
                self.withheld_polls = 1;
                None
            }
            StageCommand::GroupPosition { .. } => {
                self.advance();
                let (a, b) = self.group_axes.unwrap_or((1, 2));
                Some(format!(
                    "({}, {})",
                    format_value(self.position(a)),
                    format_value(self.position(b))
                ))
            }
            StageCommand::GroupBreak { .. } => {
                self.group_axes = None;
                None
            }
            StageCommand::JoystickMode | StageCommand::CommandMode | StageCommand::Raw(_) => None,
        }
    }
}

impl Default for SimulatedStage {
    fn default() -> Self {
        Self::new([0.0; AXES])
    }
}

impl Transport for SimulatedStage {
    fn send_sync(&mut self, command: &StageCommand) -> Result<String, ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::NotConnected);
        }
        Ok(self.execute(command).unwrap_or_default())
    }

    fn send_async(&mut self, command: &StageCommand) -> Result<(), ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::NotConnected);
        }
        if let Some(response) = self.execute(command) {
            self.responses.push_back(response);
        }
        Ok(())
    }

    fn poll_response(&mut self) -> Result<Option<String>, ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::NotConnected);
        }
        if self.withheld_polls > 0 {
            self.withheld_polls -= 1;
            return Ok(None);
        }
        if self.responses.is_empty() {
            return Ok(None);
        }
        let joined = self.responses.drain(..).collect::<Vec<_>>().join("\r\n");
        Ok(Some(joined))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn name(&self) -> String {
        "simulated".to_string()
    }
}
