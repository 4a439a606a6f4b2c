//! Error handling for MicroCut
//!
//! Provides error types for all layers of the stage/laser stack:
//! - Motion errors (travel envelope, job lifecycle, axis arguments)
//! - Instruction errors (editor shape strings that cannot be parsed)
//! - Connection errors (serial transport)
//! - Laser errors (beam collaborator)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Motion error type
///
/// Raised by the motion controller and the group movement engine. Range
/// errors are always detected before any hardware command is issued for the
/// offending step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Target lies outside the stage travel envelope
    #[error("Target ({x:.5}, {y:.5}) outside travel range [{min}, {max}] mm")]
    OutOfTravelRange {
        /// Requested X (axis 1) coordinate.
        x: f64,
        /// Requested Y (axis 2) coordinate.
        y: f64,
        /// Lower envelope bound.
        min: f64,
        /// Upper envelope bound.
        max: f64,
    },

    /// Single axis target outside the travel envelope
    #[error("Axis {axis} target {target:.5} outside travel range [{min}, {max}] mm")]
    AxisOutOfRange {
        /// Axis index (1-based).
        axis: u8,
        /// Requested position.
        target: f64,
        /// Lower envelope bound.
        min: f64,
        /// Upper envelope bound.
        max: f64,
    },

    /// Transport went away while motion state was live
    #[error("Stage transport disconnected")]
    TransportDisconnected,

    /// The stage stopped answering position queries
    #[error("Stage did not answer {polls} consecutive position queries")]
    Stalled {
        /// Number of silent polls observed.
        polls: u32,
    },

    /// A job is already running
    #[error("A group movement job is already active")]
    JobAlreadyActive,

    /// A job was requested with no instructions
    #[error("Group movement job has no instructions")]
    EmptyJob,

    /// Axis index is not one of 1..=3
    #[error("Invalid axis {axis}")]
    InvalidAxis {
        /// The rejected axis index.
        axis: u8,
    },

    /// A motion parameter is out of its accepted range
    #[error("Invalid {name}: {value} (accepted {range})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
        /// Human readable accepted range.
        range: &'static str,
    },

    /// The controller is not connected
    #[error("Stage controller not connected")]
    NotConnected,

    /// Motor power dropped while motion was expected
    #[error("Stage motors are powered off")]
    MotorsOff,

    /// The controller answered a query with something unreadable
    #[error("Unexpected reply to '{command}': {reply:?}")]
    UnexpectedReply {
        /// Command that was sent.
        command: String,
        /// What came back.
        reply: String,
    },
}

/// Shape instruction error type
///
/// Produced at the editor boundary when a shape string cannot be turned into
/// a [`crate::ShapeInstruction`]. A job is never started with a malformed
/// instruction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstructionError {
    /// The string does not have the expected shape
    #[error("Malformed instruction '{input}': {reason}")]
    Malformed {
        /// The raw editor string.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The leading shape tag is not known to the editor boundary
    #[error("Unknown shape kind '{kind}'")]
    UnknownKind {
        /// The rejected tag.
        kind: String,
    },
}

/// Connection error type
///
/// Represents errors related to the serial links to the stage controller and
/// the laser.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// The link is not open
    #[error("Not connected")]
    NotConnected,

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Laser error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaserError {
    /// Emission was requested while the laser is not armed
    #[error("Laser not ready (status {status})")]
    NotReady {
        /// Status reported at the time of the request.
        status: String,
    },

    /// No laser link
    #[error("Laser disconnected")]
    Disconnected,

    /// Status reply could not be decoded
    #[error("Invalid laser status reply '{reply}'")]
    InvalidStatus {
        /// The raw reply.
        reply: String,
    },
}

/// Main error type for MicroCut
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Motion error
    #[error(transparent)]
    Motion(#[from] MotionError),

    /// Instruction error
    #[error(transparent)]
    Instruction(#[from] InstructionError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Laser error
    #[error(transparent)]
    Laser(#[from] LaserError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error, including a disconnect seen by
    /// the motion layer
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Motion(MotionError::TransportDisconnected)
        )
    }

    /// Check if this is a travel range error
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            Error::Motion(MotionError::OutOfTravelRange { .. })
                | Error::Motion(MotionError::AxisOutOfRange { .. })
        )
    }

    /// Check if this is an instruction error
    pub fn is_instruction_error(&self) -> bool {
        matches!(self, Error::Instruction(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
