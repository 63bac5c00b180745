//! Device descriptors and the device registry
//!
//! A [`DeviceConfig`] is validated once when it is built and never changes
//! afterwards. Every consumer receives the active config explicitly.

use heapless::{String, Vec};

use gammabox_protocol::{AnodeLayout, MAX_PADS};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Maximum device name length
pub const MAX_NAME_LEN: usize = 32;

/// Maximum devices held by a [`DeviceRegistry`]
pub const MAX_DEVICES: usize = 16;

/// Device name
pub type DeviceName = String<MAX_NAME_LEN>;

/// Unvalidated device description, as written in a config file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSpec {
    pub device_name: DeviceName,
    pub num_pads: u16,
    pub min_amp: f32,
    pub max_amp: f32,
    pub min_width: u32,
    pub max_width: u32,
    pub base_freq: u32,
    pub min_freq: u32,
    pub max_freq: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub use_special_anodes: bool,
    /// Zero-based indices of fixed anode pads
    #[cfg_attr(feature = "serde", serde(default))]
    pub anode_indices: Vec<u16, MAX_PADS>,
}

/// Validated, immutable device descriptor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(try_from = "DeviceSpec"))]
pub struct DeviceConfig {
    spec: DeviceSpec,
}

impl TryFrom<DeviceSpec> for DeviceConfig {
    type Error = ConfigError;

    fn try_from(spec: DeviceSpec) -> Result<Self, Self::Error> {
        Self::new(spec)
    }
}

impl DeviceConfig {
    /// Validate a device description
    pub fn new(spec: DeviceSpec) -> Result<Self, ConfigError> {
        if spec.num_pads == 0 {
            return Err(ConfigError::NoPads);
        }
        if spec.num_pads as usize > MAX_PADS {
            return Err(ConfigError::TooManyPads(spec.num_pads));
        }
        if let Some(&bad) = spec.anode_indices.iter().find(|&&a| a >= spec.num_pads) {
            return Err(ConfigError::AnodeOutOfRange(bad));
        }
        if !(spec.min_amp >= 0.0 && spec.min_amp <= spec.max_amp && spec.max_amp.is_finite()) {
            return Err(ConfigError::InvalidRange("amplitude"));
        }
        if spec.min_width > spec.max_width {
            return Err(ConfigError::InvalidRange("width"));
        }
        if spec.min_freq > spec.max_freq {
            return Err(ConfigError::InvalidRange("frequency"));
        }
        if spec.base_freq < spec.min_freq || spec.base_freq > spec.max_freq {
            return Err(ConfigError::BaseFrequencyOutOfRange(spec.base_freq));
        }
        Ok(Self { spec })
    }

    pub fn device_name(&self) -> &str {
        &self.spec.device_name
    }

    pub fn num_pads(&self) -> usize {
        self.spec.num_pads as usize
    }

    pub fn min_amp(&self) -> f32 {
        self.spec.min_amp
    }

    pub fn max_amp(&self) -> f32 {
        self.spec.max_amp
    }

    pub fn min_width(&self) -> u32 {
        self.spec.min_width
    }

    pub fn max_width(&self) -> u32 {
        self.spec.max_width
    }

    pub fn base_freq(&self) -> u32 {
        self.spec.base_freq
    }

    pub fn min_freq(&self) -> u32 {
        self.spec.min_freq
    }

    pub fn max_freq(&self) -> u32 {
        self.spec.max_freq
    }

    pub fn use_special_anodes(&self) -> bool {
        self.spec.use_special_anodes
    }

    pub fn anode_indices(&self) -> &[u16] {
        &self.spec.anode_indices
    }

    /// Whether `pad` (zero-based) is a fixed anode
    pub fn is_anode(&self, pad: usize) -> bool {
        self.spec.anode_indices.iter().any(|&a| a as usize == pad)
    }

    /// Anode layout handed to the command encoder
    pub fn anode_layout(&self) -> AnodeLayout<'_> {
        AnodeLayout {
            special_anodes: self.spec.use_special_anodes,
            anodes: &self.spec.anode_indices,
        }
    }

    /// The description this config was built from
    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }
}

/// Loaded device configurations, sorted by name
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceConfig, MAX_DEVICES>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { devices: Vec::new() }
    }

    /// Build a registry, collecting the names of rejected duplicates
    ///
    /// The first config with a given name wins.
    pub fn from_configs<I>(configs: I) -> (Self, Vec<DeviceName, MAX_DEVICES>)
    where
        I: IntoIterator<Item = DeviceConfig>,
    {
        let mut registry = Self::new();
        let mut rejected = Vec::new();
        for config in configs {
            let name = config.spec.device_name.clone();
            if registry.insert(config).is_err() {
                let _ = rejected.push(name);
            }
        }
        (registry, rejected)
    }

    /// Add a device, keeping the registry sorted by name
    pub fn insert(&mut self, config: DeviceConfig) -> Result<(), ConfigError> {
        let position = match self.search(config.device_name()) {
            Ok(_) => return Err(ConfigError::DuplicateDevice),
            Err(position) => position,
        };
        self.devices
            .insert(position, config)
            .map_err(|_| ConfigError::RegistryFull)
    }

    /// Look a device up by name
    pub fn get(&self, name: &str) -> Option<&DeviceConfig> {
        self.search(name).ok().map(|i| &self.devices[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.device_name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn search(&self, name: &str) -> Result<usize, usize> {
        self.devices
            .binary_search_by(|d| d.device_name().cmp(name))
    }
}
