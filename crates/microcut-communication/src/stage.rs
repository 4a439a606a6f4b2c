//! Serial transport for the ESP-301 style stage controller.

use crate::command::StageCommand;
use crate::serial::SerialLink;
use crate::transport::Transport;
use microcut_core::ConnectionError;
use std::time::Duration;

/// Serial line parameters for the stage controller
#[derive(Debug, Clone, PartialEq)]
pub struct SerialStageParams {
    /// Port name.
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout of the port.
    pub timeout: Duration,
    /// Time a synchronous command waits before reading the answer.
    pub settle: Duration,
}

impl Default for SerialStageParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 921_600,
            timeout: Duration::from_secs(1),
            settle: Duration::from_millis(200),
        }
    }
}

/// Stage controller reached over a serial line
#[derive(Debug)]
pub struct SerialStage {
    link: Option<SerialLink>,
    params: SerialStageParams,
}

impl SerialStage {
    /// Open the port described by `params`
    pub fn connect(params: SerialStageParams) -> Result<Self, ConnectionError> {
        let link = SerialLink::open(&params.port, params.baud_rate, params.timeout)?;
        Ok(Self {
            link: Some(link),
            params,
        })
    }

    /// Close the port; the transport reports disconnected afterwards
    pub fn disconnect(&mut self) {
        if self.link.take().is_some() {
            tracing::info!("Closed stage port {}", self.params.port);
        }
    }

    fn link(&mut self) -> Result<&mut SerialLink, ConnectionError> {
        self.link.as_mut().ok_or(ConnectionError::NotConnected)
    }

    fn drop_on_error<T>(
        &mut self,
        result: Result<T, ConnectionError>,
    ) -> Result<T, ConnectionError> {
        if let Err(ConnectionError::ConnectionLost { reason }) = &result {
            tracing::error!("Stage link {} lost: {}", self.params.port, reason);
            self.link = None;
        }
        result
    }
}

impl Transport for SerialStage {
    fn send_sync(&mut self, command: &StageCommand) -> Result<String, ConnectionError> {
        let settle = self.params.settle;
        let text = command.to_string();
        let result = self.link().and_then(|link| {
            link.write_line(&text)?;
            std::thread::sleep(settle);
            link.read_available()
        });
        self.drop_on_error(result)
    }

    fn send_async(&mut self, command: &StageCommand) -> Result<(), ConnectionError> {
        let text = command.to_string();
        let result = self.link().and_then(|link| link.write_line(&text));
        self.drop_on_error(result)
    }

    fn poll_response(&mut self) -> Result<Option<String>, ConnectionError> {
        let result = self.link().and_then(|link| link.read_available());
        let text = self.drop_on_error(result)?;
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn name(&self) -> String {
        self.params.port.clone()
    }
}
