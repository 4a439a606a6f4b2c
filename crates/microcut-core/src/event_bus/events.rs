//! Event type definitions for the event bus.
//!
//! Events are grouped by category. They are cloneable and serializable so a
//! subscriber can log or forward them unchanged.

use serde::{Deserialize, Serialize};

use crate::data::{ControllerStatus, LaserStatus};
use crate::geometry::Point3;

/// Root event enum for all events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Stage link events
    Connection(ConnectionEvent),
    /// Stage position and status
    Motion(MotionEvent),
    /// Group movement job lifecycle
    Job(JobEvent),
    /// Laser state
    Laser(LaserEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Connection(_) => EventCategory::Connection,
            AppEvent::Motion(_) => EventCategory::Motion,
            AppEvent::Job(_) => EventCategory::Job,
            AppEvent::Laser(_) => EventCategory::Laser,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Connection(e) => e.description(),
            AppEvent::Motion(e) => e.description(),
            AppEvent::Job(e) => e.description(),
            AppEvent::Laser(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Stage link events.
    Connection,
    /// Position and status events.
    Motion,
    /// Job lifecycle events.
    Job,
    /// Laser events.
    Laser,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Motion => write!(f, "Motion"),
            EventCategory::Job => write!(f, "Job"),
            EventCategory::Laser => write!(f, "Laser"),
        }
    }
}

/// Stage link events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Link established and controller initialised.
    Connected {
        /// Port or transport name.
        port: String,
    },
    /// Link lost or closed.
    Disconnected {
        /// Port or transport name.
        port: String,
        /// Why the link went away.
        reason: String,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Connected { port } => format!("Connected to {}", port),
            ConnectionEvent::Disconnected { port, reason } => {
                format!("Disconnected from {}: {}", port, reason)
            }
        }
    }
}

/// Stage position and status events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotionEvent {
    /// Logical position changed.
    PositionUpdated {
        /// New logical position of all axes.
        position: Point3,
    },
    /// Controller status changed.
    StatusChanged {
        /// Previous status.
        old: ControllerStatus,
        /// New status.
        new: ControllerStatus,
    },
}

impl MotionEvent {
    fn description(&self) -> String {
        match self {
            MotionEvent::PositionUpdated { position } => format!("Position {}", position),
            MotionEvent::StatusChanged { old, new } => format!("Status {} -> {}", old, new),
        }
    }
}

/// Group movement job lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job accepted and group defined.
    Started {
        /// Number of instructions as submitted.
        instructions: usize,
        /// Whether the laser is gated during the job.
        cut_enabled: bool,
    },
    /// Engine entered a new step.
    StepChanged {
        /// Index of the current instruction.
        item: usize,
        /// Step within the instruction (0..=5).
        step: u8,
    },
    /// All instructions completed, or a stop request was honoured.
    Finished {
        /// Number of instructions after ring expansion.
        instructions: usize,
        /// Whether the job ended early on request.
        stopped: bool,
    },
    /// Job abandoned after a fault.
    Aborted {
        /// Human-readable cause.
        reason: String,
    },
}

impl JobEvent {
    fn description(&self) -> String {
        match self {
            JobEvent::Started {
                instructions,
                cut_enabled,
            } => format!(
                "Job started ({} instructions, cut {})",
                instructions,
                if *cut_enabled { "on" } else { "off" }
            ),
            JobEvent::StepChanged { item, step } => format!("Item {} step {}", item, step),
            JobEvent::Finished {
                instructions,
                stopped,
            } => {
                if *stopped {
                    format!("Job stopped ({} instructions)", instructions)
                } else {
                    format!("Job finished ({} instructions)", instructions)
                }
            }
            JobEvent::Aborted { reason } => format!("Job aborted: {}", reason),
        }
    }
}

/// Laser events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LaserEvent {
    /// Emission switched.
    EmissionChanged {
        /// True when the beam was switched on.
        on: bool,
    },
    /// Laser reported a status.
    StatusChanged {
        /// Reported status.
        status: LaserStatus,
    },
}

impl LaserEvent {
    fn description(&self) -> String {
        match self {
            LaserEvent::EmissionChanged { on } => {
                format!("Laser emission {}", if *on { "on" } else { "off" })
            }
            LaserEvent::StatusChanged { status } => format!("Laser status {}", status),
        }
    }
}
