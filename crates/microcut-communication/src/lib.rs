//! # MicroCut Communication
//!
//! Transports for the stage controller and the cutting laser. Serial links
//! for the real hardware, an in-memory controller and laser for tests and
//! dry runs, and the typed command set whose text form only exists here.

pub mod command;
pub mod laser;
pub mod serial;
pub mod simulated;
pub mod stage;
pub mod status;
pub mod transport;

pub use command::{format_value, StageCommand};
pub use laser::{
    decode_laser_status, Laser, LaserCall, LaserCommand, NpiLaser, SharedLaser, SimulatedLaser,
};
pub use serial::{list_ports, SerialLink, SerialPortInfo};
pub use simulated::SimulatedStage;
pub use stage::{SerialStage, SerialStageParams};
pub use status::{decode_status, StageStatus};
pub use transport::{last_line, SharedTransport, Transport};
