//! Outbound command encoding.
//!
//! Commands are rendered into a fixed-capacity [`CommandString`]. The line
//! terminator is not part of the rendered text; the transport appends
//! [`LINE_TERMINATOR`] when it writes the line.

use core::fmt::Write;

use heapless::String;

use crate::stim::StimFrame;

/// Maximum number of pads a device may declare
pub const MAX_PADS: usize = 64;

/// Maximum rendered command length in bytes
///
/// Sized for a full stimulation command on a [`MAX_PADS`] device.
pub const MAX_COMMAND_LEN: usize = 2048;

/// Terminator appended to every outbound line by the transport
pub const LINE_TERMINATOR: char = '\r';

/// A rendered command line, without terminator
pub type CommandString = String<MAX_COMMAND_LEN>;

/// Identification sent first in every handshake
pub const IDENTIFY: &str = "iam TACTILITY";

/// Battery telemetry request
pub const BATTERY_QUERY: &str = "battery ?";

/// Stimulation enable
pub const STIM_ON: &str = "stim on";

/// Stimulation disable
pub const STIM_OFF: &str = "stim off";

/// Deselects every pad
pub const RESET_PADS: &str = "velec 11 *selected 0";

/// Errors that can occur while rendering a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Rendered text does not fit in [`MAX_COMMAND_LEN`]
    CommandTooLong,
    /// Pad, amplitude and width slices differ in length
    LengthMismatch,
    /// More pads than [`MAX_PADS`], or a pad index outside the device
    PadOutOfRange,
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CommandTooLong => write!(f, "command exceeds {} bytes", MAX_COMMAND_LEN),
            Self::LengthMismatch => write!(f, "pad, amplitude and width arrays differ in length"),
            Self::PadOutOfRange => write!(f, "pad index out of range"),
        }
    }
}

/// Commands the host can send to the box
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command<'a> {
    /// Handshake identification (`iam TACTILITY`)
    Identify,
    /// Pad-count declaration (`elec 1 *pads_qty N`)
    DeclarePads(u16),
    /// Battery telemetry request
    BatteryQuery,
    /// Stimulation frequency in Hz
    Frequency(u32),
    /// Stimulation on or off
    Stimulation(bool),
    /// Deselect all pads
    ResetPads,
    /// Combined per-pad stimulation command
    Stimulate(StimFrame<'a>),
}

impl Command<'_> {
    /// Render the command text
    pub fn encode(&self) -> Result<CommandString, EncodeError> {
        let mut out = CommandString::new();
        match self {
            Self::Identify => push(&mut out, IDENTIFY)?,
            Self::DeclarePads(count) => {
                write!(out, "elec 1 *pads_qty {}", count).map_err(|_| EncodeError::CommandTooLong)?
            }
            Self::BatteryQuery => push(&mut out, BATTERY_QUERY)?,
            Self::Frequency(hz) => {
                write!(out, "freq {}", hz).map_err(|_| EncodeError::CommandTooLong)?
            }
            Self::Stimulation(true) => push(&mut out, STIM_ON)?,
            Self::Stimulation(false) => push(&mut out, STIM_OFF)?,
            Self::ResetPads => push(&mut out, RESET_PADS)?,
            Self::Stimulate(frame) => frame.write_to(&mut out)?,
        }
        Ok(out)
    }

    /// Whether this command must skip the outbound rate limit
    ///
    /// Stimulation toggles and pad resets are safety-relevant and always
    /// reach the device, even when the queue is saturated.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::Stimulation(_) | Self::ResetPads)
    }
}

/// Append a literal, mapping capacity overflow to [`EncodeError::CommandTooLong`]
pub(crate) fn push(out: &mut CommandString, text: &str) -> Result<(), EncodeError> {
    out.push_str(text).map_err(|_| EncodeError::CommandTooLong)
}
