//! # MicroCut Core
//!
//! Shared vocabulary for the MicroCut stage and laser stack: geometry,
//! shape instructions, status enums, the error taxonomy and the event bus.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod geometry;
pub mod shapes;

pub use data::{ControllerStatus, Direction, LaserStatus};

pub use error::{ConnectionError, Error, InstructionError, LaserError, MotionError, Result};

pub use event_bus::{
    event_bus, AppEvent, ConnectionEvent, EventBus, EventBusConfig, EventCategory, EventFilter,
    JobEvent, LaserEvent, MotionEvent, SubscriptionId,
};

pub use geometry::{round_to, Point2, Point3};

pub use shapes::{parse_instructions, ShapeInstruction, ShapeKind};
