//! Serial port discovery
//!
//! Sends the identification command to every port and keeps the first one
//! that acknowledges it.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use gammabox_protocol::command::IDENTIFY;
use gammabox_protocol::is_acknowledgement;

use crate::error::HostError;
use crate::transport::serial::open_port;
use crate::transport::{SerialSettings, SerialTransport, Transport};

/// Wait between identifying and reading the answer
pub const PROBE_SETTLE: Duration = Duration::from_millis(100);

/// Lines read while looking for the acknowledgement
const PROBE_LINES: usize = 4;

/// Whether a gamma box answers on `transport`
pub fn probe(transport: &mut dyn Transport, settle: Duration) -> Result<bool, HostError> {
    let mut lines = transport.take_reader()?;
    transport.write_line(IDENTIFY)?;
    thread::sleep(settle);

    for _ in 0..PROBE_LINES {
        match lines.next_line()? {
            Some(line) if is_acknowledgement(&line) => return Ok(true),
            Some(line) => debug!("{}: ignoring '{}'", transport.port_name(), line),
            None => return Ok(false),
        }
    }
    Ok(false)
}

/// First serial port with a gamma box on it
pub fn find_box(settings: &SerialSettings) -> Result<Option<String>, HostError> {
    let ports = serialport::available_ports().map_err(|source| HostError::Serial {
        port: "*".to_string(),
        source,
    })?;
    info!("Scanning {} serial port(s)", ports.len());

    for info in ports {
        let name = info.port_name;
        let port = match open_port(&name, settings.baud_rate, settings.probe_timeout_ms) {
            Ok(port) => port,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                continue;
            }
        };
        let mut transport = SerialTransport::from_port(&name, port);
        match probe(&mut transport, PROBE_SETTLE) {
            Ok(true) => {
                info!("Found gamma box on {}", name);
                return Ok(Some(name));
            }
            Ok(false) => debug!("No acknowledgement on {}", name),
            Err(e) => debug!("Probe of {} failed: {}", name, e),
        }
    }
    Ok(None)
}
