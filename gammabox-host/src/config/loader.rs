//! Configuration file loading
//!
//! The default `gammabox.toml` is compiled into the binary; build.rs has
//! already checked it. Files given on the command line are parsed with the
//! same rules and then validated device by device.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use gammabox_core::config::{ControllerConfig, DeviceConfig, DeviceRegistry};

use crate::error::HostError;
use crate::transport::SerialSettings;

/// Configuration compiled into the binary
pub const DEFAULT_CONFIG: &str = include_str!("../../gammabox.toml");

/// Raw file layout
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    controller: ControllerConfig,
    #[serde(default)]
    serial: SerialSettings,
    #[serde(default, rename = "device")]
    devices: Vec<DeviceConfig>,
}

/// Loaded host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub controller: ControllerConfig,
    pub serial: SerialSettings,
    pub devices: DeviceRegistry,
}

impl HostConfig {
    /// Look up a device by name
    pub fn device(&self, name: &str) -> Result<&DeviceConfig, HostError> {
        self.devices
            .get(name)
            .ok_or_else(|| HostError::UnknownDevice(name.to_string()))
    }
}

/// Parse configuration text
///
/// Duplicate device names keep the first entry and log a warning.
pub fn parse_config(text: &str) -> Result<HostConfig, HostError> {
    let file: ConfigFile = toml::from_str(text)?;

    let (devices, rejected) = DeviceRegistry::from_configs(file.devices);
    for name in &rejected {
        warn!("Ignoring duplicate device '{}'", name);
    }

    Ok(HostConfig {
        controller: file.controller,
        serial: file.serial,
        devices,
    })
}

/// Load configuration from `path`, or the embedded default
pub fn load_config(path: Option<&Path>) -> Result<HostConfig, HostError> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            let text = fs::read_to_string(path)?;
            parse_config(&text)?
        }
        None => {
            info!("Using embedded configuration");
            parse_config(DEFAULT_CONFIG)?
        }
    };

    info!(
        "Loaded {} device(s): {}",
        config.devices.len(),
        config.devices.names().collect::<Vec<_>>().join(", ")
    );
    Ok(config)
}
