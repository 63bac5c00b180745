//! Per-pad calibration baseline and its text format
//!
//! ```text
//! glove, 0.1.0
//! 2.5,200
//! 2.75,180
//! ...
//! ```
//!
//! The header names the device and the application version that wrote the
//! file; every following line holds one pad's `amplitude,width`. Decimal
//! separators are always `.`. Widths may be fractional and are rounded to
//! whole microseconds on load.

use alloc::string::String;
use core::fmt::Write;

use heapless::Vec;

use gammabox_protocol::MAX_PADS;

use super::device::DeviceConfig;

/// Maximum stored application version length
pub const MAX_VERSION_LEN: usize = 32;

/// Errors from calibration parsing and editing
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// File is empty or has no `device, version` header
    MissingHeader,
    /// Header names a different device
    DeviceMismatch,
    /// Line count does not match the device's pad count
    PadCountMismatch { expected: usize, found: usize },
    /// A pad line could not be parsed (1-based line number)
    MalformedLine(usize),
    /// Pad index outside the device
    PadOutOfRange(usize),
    /// Amplitude and width arrays differ in length
    LengthMismatch,
}

impl core::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "calibration file has no header"),
            Self::DeviceMismatch => write!(f, "calibration file is for another device"),
            Self::PadCountMismatch { expected, found } => {
                write!(f, "expected {} pad lines, found {}", expected, found)
            }
            Self::MalformedLine(line) => write!(f, "malformed calibration line {}", line),
            Self::PadOutOfRange(pad) => write!(f, "pad {} out of range", pad),
            Self::LengthMismatch => write!(f, "amplitude and width counts differ"),
        }
    }
}

/// Per-pad baseline amplitudes and widths
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationBaseline {
    amps: Vec<f32, MAX_PADS>,
    widths: Vec<u32, MAX_PADS>,
}

/// Result of parsing a calibration file
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCalibration {
    pub baseline: CalibrationBaseline,
    /// Version recorded in the header
    pub app_version: heapless::String<MAX_VERSION_LEN>,
}

impl CalibrationBaseline {
    /// Baseline from explicit arrays
    pub fn new(amps: &[f32], widths: &[u32]) -> Result<Self, CalibrationError> {
        if amps.len() != widths.len() {
            return Err(CalibrationError::LengthMismatch);
        }
        Ok(Self {
            amps: Vec::from_slice(amps).map_err(|_| CalibrationError::PadOutOfRange(amps.len()))?,
            widths: Vec::from_slice(widths)
                .map_err(|_| CalibrationError::PadOutOfRange(widths.len()))?,
        })
    }

    /// Uncalibrated baseline: every pad at the device's minimum amplitude and width
    pub fn for_device(config: &DeviceConfig) -> Self {
        let n = config.num_pads();
        let mut amps = Vec::new();
        let mut widths = Vec::new();
        // num_pads <= MAX_PADS is checked when the config is built
        for _ in 0..n {
            let _ = amps.push(config.min_amp());
            let _ = widths.push(config.min_width());
        }
        Self { amps, widths }
    }

    pub fn amps(&self) -> &[f32] {
        &self.amps
    }

    pub fn widths(&self) -> &[u32] {
        &self.widths
    }

    pub fn len(&self) -> usize {
        self.amps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amps.is_empty()
    }

    /// Store one pad's calibrated values
    pub fn set_pad(&mut self, pad: usize, amp: f32, width: u32) -> Result<(), CalibrationError> {
        if pad >= self.amps.len() {
            return Err(CalibrationError::PadOutOfRange(pad));
        }
        self.amps[pad] = amp;
        self.widths[pad] = width;
        Ok(())
    }

    /// Parse calibration text for `config`
    ///
    /// Nothing is returned unless every line is valid; callers keep their
    /// current baseline on error.
    pub fn parse(text: &str, config: &DeviceConfig) -> Result<LoadedCalibration, CalibrationError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let header = lines.next().ok_or(CalibrationError::MissingHeader)?;
        let (device, version) = header
            .split_once(',')
            .ok_or(CalibrationError::MissingHeader)?;
        if device.trim() != config.device_name() {
            return Err(CalibrationError::DeviceMismatch);
        }

        let mut amps = Vec::<f32, MAX_PADS>::new();
        let mut widths = Vec::<u32, MAX_PADS>::new();
        let mut found = 0;
        for (index, line) in lines.enumerate() {
            found += 1;
            let line_no = index + 2;
            let (amp, width) = line
                .split_once(',')
                .ok_or(CalibrationError::MalformedLine(line_no))?;
            let amp: f32 = amp
                .trim()
                .parse()
                .map_err(|_| CalibrationError::MalformedLine(line_no))?;
            let width: f32 = width
                .trim()
                .parse()
                .map_err(|_| CalibrationError::MalformedLine(line_no))?;
            if !amp.is_finite() || amp < 0.0 || amp > config.max_amp() {
                return Err(CalibrationError::MalformedLine(line_no));
            }
            if !width.is_finite() || width < 0.0 || width > u32::MAX as f32 {
                return Err(CalibrationError::MalformedLine(line_no));
            }
            // Overflow past MAX_PADS is reported as a count mismatch below
            let _ = amps.push(amp);
            let _ = widths.push((width + 0.5) as u32);
        }
        if found != config.num_pads() {
            return Err(CalibrationError::PadCountMismatch {
                expected: config.num_pads(),
                found,
            });
        }

        let mut app_version = heapless::String::new();
        for c in version.trim().chars() {
            if app_version.push(c).is_err() {
                break;
            }
        }

        Ok(LoadedCalibration {
            baseline: Self { amps, widths },
            app_version,
        })
    }

    /// Render calibration text
    pub fn render(&self, device_name: &str, app_version: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}, {}", device_name, app_version);
        for (amp, width) in self.amps.iter().zip(self.widths.iter()) {
            let _ = writeln!(out, "{},{}", amp, width);
        }
        out
    }
}
