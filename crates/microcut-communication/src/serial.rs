//! Serial line link shared by the stage and laser transports
//!
//! Provides:
//! - Port enumeration and discovery
//! - Opening a port with baud rate and read timeout
//! - Carriage-return terminated writes
//! - Draining whatever bytes are buffered, without blocking

use microcut_core::ConnectionError;
use std::io::{Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB FTDI Serial Port")
    pub description: String,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List the serial ports present on the system
pub fn list_ports() -> Result<Vec<SerialPortInfo>, ConnectionError> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::SerialError {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let (description, vid, pid) = match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => (
                    format!(
                        "USB {} {}",
                        usb.manufacturer.as_deref().unwrap_or("Device"),
                        usb.product.as_deref().unwrap_or("Serial Port")
                    ),
                    Some(usb.vid),
                    Some(usb.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth Serial".to_string(), None, None)
                }
                serialport::SerialPortType::PciPort => ("PCI Serial".to_string(), None, None),
                _ => ("Serial Port".to_string(), None, None),
            };
            SerialPortInfo {
                port_name: port.port_name,
                description,
                vid,
                pid,
            }
        })
        .collect())
}

/// An open serial port speaking carriage-return terminated ASCII
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialLink {
    /// Open `port` at `baud_rate`
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self, ConnectionError> {
        match serialport::new(port, baud_rate).timeout(timeout).open() {
            Ok(handle) => {
                tracing::info!("Opened serial port {} at {} baud", port, baud_rate);
                Ok(Self {
                    port: handle,
                    name: port.to_string(),
                })
            }
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", port, e);
                Err(ConnectionError::FailedToOpen {
                    port: port.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write `line` followed by a carriage return
    pub fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        tracing::debug!("{} <- {}", self.name, line);
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\r');
        self.port
            .write_all(&bytes)
            .and_then(|_| self.port.flush())
            .map_err(|e| ConnectionError::ConnectionLost {
                reason: e.to_string(),
            })
    }

    /// Read everything currently buffered, with line terminators trimmed
    pub fn read_available(&mut self) -> Result<String, ConnectionError> {
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| ConnectionError::SerialError {
                reason: e.to_string(),
            })? as usize;
        if pending == 0 {
            return Ok(String::new());
        }

        let mut buf = vec![0u8; pending];
        let read = self
            .port
            .read(&mut buf)
            .map_err(|e| ConnectionError::IoError {
                reason: e.to_string(),
            })?;
        buf.truncate(read);

        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_matches(|c| c == '\r' || c == '\n').to_string();
        tracing::debug!("{} -> {:?}", self.name, text);
        Ok(text)
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").field("name", &self.name).finish()
    }
}
