//! Configuration types
//!
//! Device descriptors, controller tuning and the per-pad calibration
//! baseline. All of these are loaded once and passed explicitly to the
//! components that need them.

pub mod calibration;
pub mod controller;
pub mod device;

pub use calibration::{CalibrationBaseline, CalibrationError, LoadedCalibration};
pub use controller::ControllerConfig;
pub use device::{DeviceConfig, DeviceName, DeviceRegistry, DeviceSpec, MAX_DEVICES, MAX_NAME_LEN};

/// Errors raised while validating configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Device declares zero pads
    NoPads,
    /// Device declares more pads than the protocol supports
    TooManyPads(u16),
    /// Anode index is not a pad of the device
    AnodeOutOfRange(u16),
    /// Minimum exceeds maximum for the named range
    InvalidRange(&'static str),
    /// Base frequency lies outside the frequency range
    BaseFrequencyOutOfRange(u32),
    /// A device with this name is already registered
    DuplicateDevice,
    /// Registry capacity exhausted
    RegistryFull,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoPads => write!(f, "device must have at least one pad"),
            Self::TooManyPads(n) => write!(
                f,
                "device declares {} pads, at most {} are supported",
                n,
                gammabox_protocol::MAX_PADS
            ),
            Self::AnodeOutOfRange(pad) => write!(f, "anode index {} is not a pad", pad),
            Self::InvalidRange(what) => write!(f, "invalid {} range", what),
            Self::BaseFrequencyOutOfRange(hz) => {
                write!(f, "base frequency {} Hz outside frequency range", hz)
            }
            Self::DuplicateDevice => write!(f, "duplicate device name"),
            Self::RegistryFull => write!(f, "too many devices"),
        }
    }
}
