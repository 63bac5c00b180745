//! Per-tick contribution records

use alloc::vec::Vec;
use core::fmt;

use crate::config::DeviceConfig;

/// Which output channel a contribution drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelKind {
    /// Pad selection; a value above zero enables the pad
    PadMask,
    /// Per-pad amplitude
    Amplitude,
    /// Per-pad pulse width
    Width,
    /// Single stimulation frequency
    Frequency,
}

impl ChannelKind {
    /// Number of values a contribution of this kind carries
    pub fn expected_len(self, config: &DeviceConfig) -> usize {
        match self {
            Self::Frequency => 1,
            _ => config.num_pads(),
        }
    }

    /// Upper bound for values of this kind, if any
    pub fn limit(self, config: &DeviceConfig) -> Option<f32> {
        match self {
            Self::PadMask => None,
            Self::Amplitude => Some(config.max_amp()),
            Self::Width => Some(config.max_width() as f32),
            Self::Frequency => Some(config.max_freq() as f32),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PadMask => "pad mask",
            Self::Amplitude => "amplitude",
            Self::Width => "width",
            Self::Frequency => "frequency",
        };
        f.write_str(name)
    }
}

/// One source's request for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub kind: ChannelKind,
    pub values: Vec<f32>,
}

impl Contribution {
    pub fn new(kind: ChannelKind, values: Vec<f32>) -> Self {
        Self { kind, values }
    }

    pub fn frequency(hz: f32) -> Self {
        Self::new(ChannelKind::Frequency, alloc::vec![hz])
    }

    /// Check the contribution against the device limits
    pub fn validate(&self, config: &DeviceConfig) -> Result<(), ValidationError> {
        let expected = self.kind.expected_len(config);
        if self.values.len() != expected {
            return Err(ValidationError {
                kind: self.kind,
                fault: Fault::LengthMismatch {
                    expected,
                    actual: self.values.len(),
                },
            });
        }
        for (index, &value) in self.values.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError {
                    kind: self.kind,
                    fault: Fault::NegativeValue { index },
                });
            }
            if let Some(limit) = self.kind.limit(config) {
                if value > limit {
                    return Err(ValidationError {
                        kind: self.kind,
                        fault: Fault::OutOfRange { index, limit },
                    });
                }
            }
        }
        Ok(())
    }
}

/// Why a contribution was rejected
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// Wrong number of values
    LengthMismatch { expected: usize, actual: usize },
    /// Negative or non-finite value at `index`
    NegativeValue { index: usize },
    /// Value at `index` exceeds the device maximum
    OutOfRange { index: usize, limit: f32 },
}

/// A rejected contribution
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValidationError {
    pub kind: ChannelKind,
    pub fault: Fault,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fault {
            Fault::LengthMismatch { expected, actual } => write!(
                f,
                "{} contribution has {} values, expected {}",
                self.kind, actual, expected
            ),
            Fault::NegativeValue { index } => {
                write!(f, "{} value at {} is negative or not finite", self.kind, index)
            }
            Fault::OutOfRange { index, limit } => {
                write!(f, "{} value at {} exceeds {}", self.kind, index, limit)
            }
        }
    }
}
