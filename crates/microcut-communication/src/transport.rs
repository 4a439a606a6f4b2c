//! Transport contract between the motion engine and the stage controller.

use crate::command::StageCommand;
use microcut_core::ConnectionError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Request/response and fire-and-forget channel to the stage controller
///
/// `send_sync` blocks until the controller has had time to answer. Moves and
/// position polls go through `send_async` + `poll_response` so the caller
/// never waits on hardware between ticks.
pub trait Transport: Send {
    /// Send a command and return whatever the controller answered (may be empty)
    fn send_sync(&mut self, command: &StageCommand) -> Result<String, ConnectionError>;

    /// Send a command without reading
    fn send_async(&mut self, command: &StageCommand) -> Result<(), ConnectionError>;

    /// Collect any pending response; `None` when nothing has arrived
    fn poll_response(&mut self) -> Result<Option<String>, ConnectionError>;

    /// Whether the link is open
    fn is_connected(&self) -> bool;

    /// Port or transport name for logs and events
    fn name(&self) -> String;
}

/// Transport shared between the controller and the code that opened it
pub type SharedTransport = Arc<Mutex<dyn Transport>>;

/// Last non-empty line of a controller reply.
///
/// Replies to queued polls may pile up; only the newest line is current.
pub fn last_line(response: &str) -> &str {
    response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("")
}
