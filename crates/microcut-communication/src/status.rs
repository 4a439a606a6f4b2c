//! Controller status byte decoding.
//!
//! The status query answers with a single character whose code carries
//! bit 4 = motor power and bits 0..3 = motion of axes 1..4.

/// Decoded status byte
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageStatus {
    /// Motor power is on
    pub motor_power_on: bool,
    /// Axes currently in motion (1-based)
    pub moving_axes: Vec<u8>,
}

impl StageStatus {
    /// Build from the raw status code
    pub fn from_byte(byte: u32) -> Self {
        let motion_bits = byte & 0x0F;
        Self {
            motor_power_on: byte & (1 << 4) != 0,
            moving_axes: (0..4u8)
                .filter(|i| (motion_bits >> i) & 1 == 1)
                .map(|i| i + 1)
                .collect(),
        }
    }

    /// Status code the controller would send for this state
    pub fn to_byte(&self) -> u32 {
        let power = if self.motor_power_on { 1 << 4 } else { 0 };
        self.moving_axes
            .iter()
            .filter(|a| (1..=4).contains(*a))
            .fold(power, |acc, a| acc | 1 << (a - 1))
    }
}

/// Decode a status reply.
///
/// An empty reply decodes as all-zero (power off, nothing moving); the
/// controller stays silent while it holds a group wait. Anything longer than
/// one character on the last line is undecodable and yields `None`.
pub fn decode_status(response: &str) -> Option<StageStatus> {
    let line = response
        .trim_matches(|c| c == '\r' || c == '\n')
        .rsplit('\n')
        .next()
        .unwrap_or("")
        .trim_end_matches('\r');
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Some(StageStatus::from_byte(0)),
        (Some(c), None) => Some(StageStatus::from_byte(c as u32)),
        _ => {
            tracing::warn!("Could not decode status response {:?}", response);
            None
        }
    }
}
