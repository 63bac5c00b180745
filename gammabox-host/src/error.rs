//! Host error type

use std::path::PathBuf;

use thiserror::Error;

use gammabox_core::config::{CalibrationError, ConfigError};
use gammabox_core::modulation::SubscribeError;
use gammabox_protocol::EncodeError;

/// Errors surfaced by the host runtime
#[derive(Debug, Error)]
pub enum HostError {
    /// Serial port could not be opened or queried
    #[error("serial port {port}: {source}")]
    Serial {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Read or write on an open transport failed
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    ConfigSyntax(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Config(ConfigError),

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("calibration file {}: {error}", .path.display())]
    Calibration { path: PathBuf, error: CalibrationError },

    /// Baseline does not fit the device
    #[error("calibration baseline: {0}")]
    Baseline(CalibrationError),

    #[error("subscription rejected: {0}")]
    Subscribe(SubscribeError),

    #[error("cannot encode command: {0}")]
    Encode(EncodeError),

    /// Command needs a connected box
    #[error("gamma box is not connected")]
    NotConnected,

    /// Port scan found nothing
    #[error("no gamma box found on any serial port")]
    NoBoxFound,

    /// Box did not answer the handshake in time
    #[error("no greeting from the gamma box on {0}")]
    NoGreeting(String),
}

impl From<ConfigError> for HostError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<SubscribeError> for HostError {
    fn from(error: SubscribeError) -> Self {
        Self::Subscribe(error)
    }
}

impl From<EncodeError> for HostError {
    fn from(error: EncodeError) -> Self {
        Self::Encode(error)
    }
}

impl HostError {
    /// Transport failure from a description
    pub fn closed(what: &str) -> Self {
        Self::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{} closed", what),
        ))
    }
}
