//! Laser collaborator: the [`Laser`] contract, the NPI serial laser and an
//! in-memory stand-in.

use crate::serial::SerialLink;
use microcut_core::{ConnectionError, LaserError, LaserStatus};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Cutting laser as seen by the motion engine
pub trait Laser: Send {
    /// Query the current status
    fn status(&mut self) -> LaserStatus;

    /// Enable emission; only valid while the laser is `Ready`
    fn turn_on(&mut self) -> Result<(), LaserError>;

    /// Disable emission; a no-op when the laser is disconnected
    fn turn_off(&mut self) -> Result<(), LaserError>;
}

/// Laser shared between the controller and whoever opened it
pub type SharedLaser = Arc<Mutex<dyn Laser>>;

/// Commands of the NPI laser serial protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaserCommand {
    /// Switch emission on or off.
    Emission(bool),
    /// Select remote (0) or local (1) control.
    RemoteFlag(u8),
    /// Ask for the status word.
    Status,
}

impl fmt::Display for LaserCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaserCommand::Emission(on) => write!(f, "sEmission_flag{}", u8::from(*on)),
            LaserCommand::RemoteFlag(flag) => write!(f, "sRemote_flag{}", flag),
            LaserCommand::Status => f.write_str("gstatus"),
        }
    }
}

/// Length of the fixed prefix preceding the status bits in a `gstatus` reply
const STATUS_PREFIX_LEN: usize = 11;

/// Decode a `gstatus` reply.
///
/// The four characters after the prefix are a bit field, most significant
/// first: Power, Ready, On, Error. The highest-priority set bit wins, in the
/// order Error, On, Ready, Power.
pub fn decode_laser_status(reply: &str) -> Result<LaserStatus, LaserError> {
    let bits = reply.get(STATUS_PREFIX_LEN..).unwrap_or("");
    if bits.len() != 4 || !bits.chars().all(|c| c == '0' || c == '1') {
        return Err(LaserError::InvalidStatus {
            reply: reply.to_string(),
        });
    }
    let value = u8::from_str_radix(bits, 2).map_err(|_| LaserError::InvalidStatus {
        reply: reply.to_string(),
    })?;

    Ok(if value & 0b0001 != 0 {
        LaserStatus::Error
    } else if value & 0b0010 != 0 {
        LaserStatus::On
    } else if value & 0b0100 != 0 {
        LaserStatus::Ready
    } else if value & 0b1000 != 0 {
        LaserStatus::Power
    } else {
        LaserStatus::Disconnected
    })
}

/// NPI fibre laser on a serial line
#[derive(Debug)]
pub struct NpiLaser {
    link: Option<SerialLink>,
    settle: Duration,
    status: LaserStatus,
}

impl NpiLaser {
    /// Open the laser port, force emission off and take remote control
    pub fn connect(
        port: &str,
        baud_rate: u32,
        timeout: Duration,
        settle: Duration,
    ) -> Result<Self, ConnectionError> {
        let link = SerialLink::open(port, baud_rate, timeout)?;
        let mut laser = Self {
            link: Some(link),
            settle,
            status: LaserStatus::Power,
        };
        laser.send(LaserCommand::Emission(false))?;
        laser.configure_remote(false)?;
        let status = laser.status();
        tracing::info!("Laser on {} reports {}", port, status);
        Ok(laser)
    }

    /// A laser that is not attached; every query reports `Disconnected`
    pub fn detached() -> Self {
        Self {
            link: None,
            settle: Duration::ZERO,
            status: LaserStatus::Disconnected,
        }
    }

    /// Select local (front panel) or remote (serial) control
    pub fn configure_remote(&mut self, local: bool) -> Result<String, ConnectionError> {
        self.send(LaserCommand::RemoteFlag(u8::from(local)))
    }

    /// Switch emission off and close the port
    pub fn disconnect(&mut self) {
        if let Err(e) = self.turn_off() {
            tracing::warn!("Laser turn-off before disconnect failed: {}", e);
        }
        self.link = None;
        self.status = LaserStatus::Disconnected;
    }

    /// Last status seen, without querying
    pub fn cached_status(&self) -> LaserStatus {
        self.status
    }

    fn send(&mut self, command: LaserCommand) -> Result<String, ConnectionError> {
        let link = self.link.as_mut().ok_or(ConnectionError::NotConnected)?;
        link.write_line(&command.to_string())?;
        std::thread::sleep(self.settle);
        link.read_available()
    }
}

impl Laser for NpiLaser {
    fn status(&mut self) -> LaserStatus {
        let reply = match self.send(LaserCommand::Status) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Laser status query failed: {}", e);
                self.status = LaserStatus::Disconnected;
                return self.status;
            }
        };
        self.status = decode_laser_status(reply.trim()).unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            LaserStatus::Disconnected
        });
        self.status
    }

    fn turn_on(&mut self) -> Result<(), LaserError> {
        if self.status != LaserStatus::Ready {
            return Err(LaserError::NotReady {
                status: self.status.to_string(),
            });
        }
        self.send(LaserCommand::Emission(true))
            .map_err(|_| LaserError::Disconnected)?;
        self.status();
        Ok(())
    }

    fn turn_off(&mut self) -> Result<(), LaserError> {
        if self.status == LaserStatus::Disconnected {
            return Ok(());
        }
        self.send(LaserCommand::Emission(false))
            .map_err(|_| LaserError::Disconnected)?;
        self.status();
        Ok(())
    }
}

/// Calls observed by a [`SimulatedLaser`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaserCall {
    /// `turn_on` was called.
    TurnOn,
    /// `turn_off` was called.
    TurnOff,
}

/// In-memory laser that follows the NPI state rules and records every switch
#[derive(Debug, Clone)]
pub struct SimulatedLaser {
    status: LaserStatus,
    calls: Vec<LaserCall>,
}

impl SimulatedLaser {
    /// Create a laser reporting `status`
    pub fn new(status: LaserStatus) -> Self {
        Self {
            status,
            calls: Vec::new(),
        }
    }

    /// Force the reported status
    pub fn set_status(&mut self, status: LaserStatus) {
        self.status = status;
    }

    /// Switch calls in order
    pub fn calls(&self) -> &[LaserCall] {
        &self.calls
    }

    /// Number of `turn_off` calls
    pub fn turn_off_count(&self) -> usize {
        self.calls.iter().filter(|c| **c == LaserCall::TurnOff).count()
    }
}

impl Laser for SimulatedLaser {
    fn status(&mut self) -> LaserStatus {
        self.status
    }

    fn turn_on(&mut self) -> Result<(), LaserError> {
        self.calls.push(LaserCall::TurnOn);
        if self.status != LaserStatus::Ready {
            return Err(LaserError::NotReady {
                status: self.status.to_string(),
            });
        }
        self.status = LaserStatus::On;
        Ok(())
    }

    fn turn_off(&mut self) -> Result<(), LaserError> {
        self.calls.push(LaserCall::TurnOff);
        if self.status == LaserStatus::On {
            self.status = LaserStatus::Ready;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_priority() {
        assert_eq!(decode_laser_status("statusword:1100"), Ok(LaserStatus::Ready));
        assert_eq!(decode_laser_status("statusword:1110"), Ok(LaserStatus::On));
        assert_eq!(decode_laser_status("statusword:1111"), Ok(LaserStatus::Error));
        assert_eq!(decode_laser_status("statusword:1000"), Ok(LaserStatus::Power));
        assert_eq!(
            decode_laser_status("statusword:0000"),
            Ok(LaserStatus::Disconnected)
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_laser_status("").is_err());
        assert!(decode_laser_status("statusword:12").is_err());
        assert!(decode_laser_status("statusword:10201").is_err());
    }

    #[test]
    fn test_command_text() {
        assert_eq!(LaserCommand::Emission(true).to_string(), "sEmission_flag1");
        assert_eq!(LaserCommand::RemoteFlag(0).to_string(), "sRemote_flag0");
        assert_eq!(LaserCommand::Status.to_string(), "gstatus");
    }

    #[test]
    fn test_detached_laser() {
        let mut laser = NpiLaser::detached();
        assert_eq!(laser.status(), LaserStatus::Disconnected);
        assert!(laser.turn_off().is_ok());
        assert!(matches!(laser.turn_on(), Err(LaserError::NotReady { .. })));
    }

    #[test]
    fn test_simulated_laser_gating() {
        let mut laser = SimulatedLaser::new(LaserStatus::Power);
        assert!(laser.turn_on().is_err());
        laser.set_status(LaserStatus::Ready);
        laser.turn_on().unwrap();
        assert_eq!(laser.status(), LaserStatus::On);
        laser.turn_off().unwrap();
        assert_eq!(laser.status(), LaserStatus::Ready);
        assert_eq!(
            laser.calls(),
            &[LaserCall::TurnOn, LaserCall::TurnOn, LaserCall::TurnOff]
        );
    }
}
