//! Configuration loading and calibration persistence
//!
//! Loads device and controller configuration from a TOML file, falling
//! back to the copy embedded at build time.

pub mod calibration;
pub mod loader;

pub use calibration::{
    calibration_file_name, list_calibrations, load_calibration, load_calibration_or_default,
    save_calibration, APP_VERSION,
};
pub use loader::{load_config, parse_config, HostConfig, DEFAULT_CONFIG};
