//! Serial port transport

use std::io::Write;
use std::time::Duration;

use log::info;
use serde::Deserialize;
use serialport::SerialPort;

use super::{terminated, LineReader, LineSource, Transport};
use crate::error::HostError;

/// Line rate of the gamma box
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port settings from the `[serial]` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Read timeout of an open link
    pub timeout_ms: u64,
    /// Read timeout while probing ports during a scan
    pub probe_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 100,
            probe_timeout_ms: 500,
        }
    }
}

/// Open a port at 8N1 with the given read timeout
pub(crate) fn open_port(
    port_name: &str,
    baud_rate: u32,
    timeout_ms: u64,
) -> Result<Box<dyn SerialPort>, HostError> {
    serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(timeout_ms))
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(|source| HostError::Serial {
            port: port_name.to_string(),
            source,
        })
}

/// Gamma box attached to a serial port
pub struct SerialTransport {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(port_name: &str, settings: &SerialSettings) -> Result<Self, HostError> {
        let port = open_port(port_name, settings.baud_rate, settings.timeout_ms)?;
        info!("Opened {} at {} baud", port_name, settings.baud_rate);
        Ok(Self::from_port(port_name, port))
    }

    /// Wrap an already open port
    pub fn from_port(port_name: &str, port: Box<dyn SerialPort>) -> Self {
        Self {
            port_name: port_name.to_string(),
            port,
        }
    }
}

impl Transport for SerialTransport {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn write_line(&mut self, line: &str) -> Result<(), HostError> {
        self.port.write_all(terminated(line).as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    fn take_reader(&mut self) -> Result<Box<dyn LineSource>, HostError> {
        let port = self.port.try_clone().map_err(|source| HostError::Serial {
            port: self.port_name.clone(),
            source,
        })?;
        Ok(Box::new(LineReader::new(port)))
    }
}
