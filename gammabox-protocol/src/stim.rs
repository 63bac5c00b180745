//! Combined stimulation command (`velec`) encoding and decoding.
//!
//! ```text
//! velec 11 [*special_anodes 1 ]*name test *elec 1 *pads <P> *amp <A> *width <W> *selected 1 *sync 0
//! ```
//!
//! `<P>` lists `n=C` for every enabled cathode and, when the device has no
//! special anodes, `n=A` for every enabled fixed anode. `<A>` and `<W>` list
//! `n=value` for the cathodes only. Pad numbers on the wire are 1-based.
//! Empty segments stay in the line, giving `*pads  *amp  *width ` with doubled
//! spaces.

use core::fmt::Write;

use heapless::Vec;

use crate::command::{push, CommandString, EncodeError, MAX_PADS};

const STIM_HEADER: &str = "velec 11 ";
const SPECIAL_ANODES: &str = "*special_anodes 1 ";
const PADS_SEGMENT: &str = "*name test *elec 1 *pads ";
const AMP_SEGMENT: &str = " *amp ";
const WIDTH_SEGMENT: &str = " *width ";
const STIM_SUFFIX: &str = " *selected 1 *sync 0";

/// Polarity role of a pad inside a stimulation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PadRole {
    /// Carries the stimulation current (`=C`)
    Cathode,
    /// Return path (`=A`)
    Anode,
}

/// How a device lays out its return electrodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnodeLayout<'a> {
    /// Firmware infers the anodes; anode pads are left out of the command
    pub special_anodes: bool,
    /// Zero-based indices of fixed anode pads
    pub anodes: &'a [u16],
}

impl<'a> AnodeLayout<'a> {
    /// Layout with no fixed anodes
    pub const fn none(special_anodes: bool) -> Self {
        Self {
            special_anodes,
            anodes: &[],
        }
    }

    fn is_anode(&self, pad: usize) -> bool {
        self.anodes.iter().any(|&a| a as usize == pad)
    }
}

/// Aligned per-pad arrays rendered into one `velec` command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StimFrame<'a> {
    pub pads: &'a [bool],
    pub amps: &'a [f32],
    pub widths: &'a [u32],
    pub layout: AnodeLayout<'a>,
}

impl<'a> StimFrame<'a> {
    pub fn new(
        pads: &'a [bool],
        amps: &'a [f32],
        widths: &'a [u32],
        layout: AnodeLayout<'a>,
    ) -> Self {
        Self {
            pads,
            amps,
            widths,
            layout,
        }
    }

    /// Role of pad `i` in the rendered command, `None` when it is left out
    pub fn role(&self, pad: usize) -> Option<PadRole> {
        if !self.pads[pad] {
            return None;
        }
        if !self.layout.is_anode(pad) {
            Some(PadRole::Cathode)
        } else if self.layout.special_anodes {
            None
        } else {
            Some(PadRole::Anode)
        }
    }

    /// Render the command into `out`
    pub fn write_to(&self, out: &mut CommandString) -> Result<(), EncodeError> {
        let count = self.pads.len();
        if self.amps.len() != count || self.widths.len() != count {
            return Err(EncodeError::LengthMismatch);
        }
        if count > MAX_PADS {
            return Err(EncodeError::PadOutOfRange);
        }

        push(out, STIM_HEADER)?;
        if self.layout.special_anodes {
            push(out, SPECIAL_ANODES)?;
        }

        push(out, PADS_SEGMENT)?;
        let mut list = ListWriter::new(out);
        for pad in 0..count {
            match self.role(pad) {
                Some(PadRole::Cathode) => list.entry(format_args!("{}=C", pad + 1))?,
                Some(PadRole::Anode) => list.entry(format_args!("{}=A", pad + 1))?,
                None => {}
            }
        }

        push(out, AMP_SEGMENT)?;
        let mut list = ListWriter::new(out);
        for pad in self.cathodes() {
            list.entry(format_args!("{}={}", pad + 1, self.amps[pad]))?;
        }

        push(out, WIDTH_SEGMENT)?;
        let mut list = ListWriter::new(out);
        for pad in self.cathodes() {
            list.entry(format_args!("{}={}", pad + 1, self.widths[pad]))?;
        }

        push(out, STIM_SUFFIX)
    }

    fn cathodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.pads.len()).filter(move |&pad| self.role(pad) == Some(PadRole::Cathode))
    }
}

/// Render a command that enables a single pad, used for calibration pulses
///
/// `pad` is zero-based. Every other pad is disabled.
pub fn single_pad(
    num_pads: usize,
    pad: usize,
    amp: f32,
    width: u32,
    layout: AnodeLayout<'_>,
) -> Result<CommandString, EncodeError> {
    if num_pads > MAX_PADS || pad >= num_pads {
        return Err(EncodeError::PadOutOfRange);
    }
    let mut pads = [false; MAX_PADS];
    let mut amps = [0.0f32; MAX_PADS];
    let mut widths = [0u32; MAX_PADS];
    pads[pad] = true;
    amps[pad] = amp;
    widths[pad] = width;

    let mut out = CommandString::new();
    StimFrame::new(&pads[..num_pads], &amps[..num_pads], &widths[..num_pads], layout)
        .write_to(&mut out)?;
    Ok(out)
}

/// Comma-joined list writer; separators go between entries only
struct ListWriter<'o> {
    out: &'o mut CommandString,
    first: bool,
}

impl<'o> ListWriter<'o> {
    fn new(out: &'o mut CommandString) -> Self {
        Self { out, first: true }
    }

    fn entry(&mut self, args: core::fmt::Arguments<'_>) -> Result<(), EncodeError> {
        if !self.first {
            push(self.out, ",")?;
        }
        self.first = false;
        self.out
            .write_fmt(args)
            .map_err(|_| EncodeError::CommandTooLong)
    }
}

/// Errors from [`StimCommand::parse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StimParseError {
    /// Line does not start with `velec`
    NotStimCommand,
    /// A `n=value` entry could not be parsed
    MalformedEntry,
    /// Pad number is zero or larger than [`MAX_PADS`]
    PadOutOfRange,
    /// `*amp` or `*width` names a pad missing from `*pads`
    UnknownPad,
}

impl core::fmt::Display for StimParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotStimCommand => write!(f, "not a velec command"),
            Self::MalformedEntry => write!(f, "malformed pad entry"),
            Self::PadOutOfRange => write!(f, "pad number out of range"),
            Self::UnknownPad => write!(f, "value for a pad that is not selected"),
        }
    }
}

/// One pad as decoded from a `velec` command
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PadSetting {
    /// Zero-based pad index
    pub pad: u16,
    pub role: PadRole,
    pub amp: f32,
    pub width: u32,
}

/// Decoded `velec` command
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StimCommand {
    pub special_anodes: bool,
    /// `*selected` flag; `false` for the pad reset command
    pub selected: bool,
    /// Pads in the order they appear under `*pads`
    pub pads: Vec<PadSetting, MAX_PADS>,
}

impl StimCommand {
    /// Decode a `velec` line
    pub fn parse(line: &str) -> Result<Self, StimParseError> {
        let mut tokens = line.split_ascii_whitespace().peekable();
        if tokens.next() != Some("velec") {
            return Err(StimParseError::NotStimCommand);
        }

        let mut cmd = StimCommand::default();
        while let Some(token) = tokens.next() {
            // Value lists are a single token, or absent when the segment is empty
            let value = match tokens.peek() {
                Some(next) if !next.starts_with('*') => tokens.next(),
                _ => None,
            };
            match token {
                "*special_anodes" => cmd.special_anodes = value == Some("1"),
                "*selected" => cmd.selected = value == Some("1"),
                "*pads" => {
                    for (pad, text) in entries(value)? {
                        let role = match text {
                            "C" => PadRole::Cathode,
                            "A" => PadRole::Anode,
                            _ => return Err(StimParseError::MalformedEntry),
                        };
                        cmd.pads
                            .push(PadSetting {
                                pad,
                                role,
                                amp: 0.0,
                                width: 0,
                            })
                            .map_err(|_| StimParseError::PadOutOfRange)?;
                    }
                }
                "*amp" => {
                    for (pad, text) in entries(value)? {
                        let amp = text.parse().map_err(|_| StimParseError::MalformedEntry)?;
                        cmd.pad_mut(pad)?.amp = amp;
                    }
                }
                "*width" => {
                    for (pad, text) in entries(value)? {
                        let width = text.parse().map_err(|_| StimParseError::MalformedEntry)?;
                        cmd.pad_mut(pad)?.width = width;
                    }
                }
                _ => {}
            }
        }
        Ok(cmd)
    }

    /// Setting for a zero-based pad index, if it was selected
    pub fn pad(&self, pad: u16) -> Option<&PadSetting> {
        self.pads.iter().find(|p| p.pad == pad)
    }

    /// Zero-based indices of the selected cathodes
    pub fn cathodes(&self) -> impl Iterator<Item = u16> + '_ {
        self.pads
            .iter()
            .filter(|p| p.role == PadRole::Cathode)
            .map(|p| p.pad)
    }

    fn pad_mut(&mut self, pad: u16) -> Result<&mut PadSetting, StimParseError> {
        self.pads
            .iter_mut()
            .find(|p| p.pad == pad)
            .ok_or(StimParseError::UnknownPad)
    }
}

/// Split `1=C,2=C` into zero-based pad indices and value text
fn entries(list: Option<&str>) -> Result<Vec<(u16, &str), MAX_PADS>, StimParseError> {
    let mut out = Vec::new();
    let Some(list) = list else {
        return Ok(out);
    };
    for entry in list.split(',').filter(|e| !e.is_empty()) {
        let (number, value) = entry
            .split_once('=')
            .ok_or(StimParseError::MalformedEntry)?;
        let number: u16 = number
            .parse()
            .map_err(|_| StimParseError::MalformedEntry)?;
        if number == 0 || number as usize > MAX_PADS {
            return Err(StimParseError::PadOutOfRange);
        }
        out.push((number - 1, value))
            .map_err(|_| StimParseError::PadOutOfRange)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::vec::Vec as StdVec;

    fn render(frame: StimFrame<'_>) -> CommandString {
        let mut out = CommandString::new();
        frame.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_glove_style_command() {
        let pads = [true, false, true, true];
        let amps = [2.5, 0.0, 3.0, 1.0];
        let widths = [200, 0, 250, 300];
        let out = render(StimFrame::new(&pads, &amps, &widths, AnodeLayout::none(true)));
        assert_eq!(
            out.as_str(),
            "velec 11 *special_anodes 1 *name test *elec 1 *pads 1=C,3=C,4=C \
             *amp 1=2.5,3=3,4=1 *width 1=200,3=250,4=300 *selected 1 *sync 0"
        );
    }

    #[test]
    fn test_empty_cathode_set_keeps_segments() {
        let pads = [false; 4];
        let amps = [1.0; 4];
        let widths = [100; 4];
        let out = render(StimFrame::new(&pads, &amps, &widths, AnodeLayout::none(false)));
        assert_eq!(
            out.as_str(),
            "velec 11 *name test *elec 1 *pads  *amp  *width  *selected 1 *sync 0"
        );
    }

    #[test]
    fn test_fixed_anodes_emitted_without_special_mode() {
        let pads = [true, true, true];
        let amps = [1.5, 2.0, 2.5];
        let widths = [100, 150, 200];
        let anodes = [1u16];
        let layout = AnodeLayout {
            special_anodes: false,
            anodes: &anodes,
        };
        let out = render(StimFrame::new(&pads, &amps, &widths, layout));
        assert_eq!(
            out.as_str(),
            "velec 11 *name test *elec 1 *pads 1=C,2=A,3=C *amp 1=1.5,3=2.5 \
             *width 1=100,3=200 *selected 1 *sync 0"
        );
    }

    #[test]
    fn test_disabled_anode_is_not_emitted() {
        let pads = [true, false];
        let amps = [1.0, 1.0];
        let widths = [100, 100];
        let anodes = [1u16];
        let layout = AnodeLayout {
            special_anodes: false,
            anodes: &anodes,
        };
        let out = render(StimFrame::new(&pads, &amps, &widths, layout));
        assert!(out.contains("*pads 1=C *amp"));
    }

    #[test]
    fn test_length_mismatch() {
        let pads = [true, true];
        let amps = [1.0];
        let widths = [100, 100];
        let mut out = CommandString::new();
        let err = StimFrame::new(&pads, &amps, &widths, AnodeLayout::none(false))
            .write_to(&mut out)
            .unwrap_err();
        assert_eq!(err, EncodeError::LengthMismatch);
    }

    #[test]
    fn test_single_pad_command() {
        let out = single_pad(4, 2, 3.5, 180, AnodeLayout::none(true)).unwrap();
        assert_eq!(
            out.as_str(),
            "velec 11 *special_anodes 1 *name test *elec 1 *pads 3=C *amp 3=3.5 \
             *width 3=180 *selected 1 *sync 0"
        );
        assert_eq!(
            single_pad(4, 4, 1.0, 100, AnodeLayout::none(true)),
            Err(EncodeError::PadOutOfRange)
        );
    }

    #[test]
    fn test_parse_rendered_command() {
        let pads = [true, true, false];
        let amps = [1.25, 2.0, 0.0];
        let widths = [120, 340, 0];
        let anodes = [1u16];
        let layout = AnodeLayout {
            special_anodes: false,
            anodes: &anodes,
        };
        let out = render(StimFrame::new(&pads, &amps, &widths, layout));
        let cmd = StimCommand::parse(&out).unwrap();

        assert!(!cmd.special_anodes);
        assert!(cmd.selected);
        assert_eq!(cmd.pads.len(), 2);
        let first = cmd.pad(0).unwrap();
        assert_eq!(first.role, PadRole::Cathode);
        assert_eq!(first.amp, 1.25);
        assert_eq!(first.width, 120);
        assert_eq!(cmd.pad(1).unwrap().role, PadRole::Anode);
        assert!(cmd.pad(2).is_none());
    }

    #[test]
    fn test_parse_reset_and_empty() {
        let reset = StimCommand::parse("velec 11 *selected 0").unwrap();
        assert!(!reset.selected);
        assert!(reset.pads.is_empty());

        let empty =
            StimCommand::parse("velec 11 *name test *elec 1 *pads  *amp  *width  *selected 1 *sync 0")
                .unwrap();
        assert!(empty.selected);
        assert!(empty.pads.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            StimCommand::parse("freq 50"),
            Err(StimParseError::NotStimCommand)
        );
        assert_eq!(
            StimCommand::parse("velec 11 *pads 1=X"),
            Err(StimParseError::MalformedEntry)
        );
        assert_eq!(
            StimCommand::parse("velec 11 *pads 1=C *amp 2=1.0"),
            Err(StimParseError::UnknownPad)
        );
        assert_eq!(
            StimCommand::parse("velec 11 *pads 0=C"),
            Err(StimParseError::PadOutOfRange)
        );
    }

    fn frame_inputs() -> impl Strategy<Value = (StdVec<bool>, StdVec<f32>, StdVec<u32>, StdVec<u16>, bool)>
    {
        (1usize..=MAX_PADS).prop_flat_map(|n| {
            (
                proptest::collection::vec(any::<bool>(), n),
                proptest::collection::vec(0.0f32..10.0, n),
                proptest::collection::vec(0u32..1000, n),
                proptest::collection::vec(0u16..n as u16, 0..4),
                any::<bool>(),
            )
        })
    }

    proptest! {
        #[test]
        fn test_rendering_is_deterministic((pads, amps, widths, anodes, special) in frame_inputs()) {
            let layout = AnodeLayout { special_anodes: special, anodes: &anodes };
            let a = render(StimFrame::new(&pads, &amps, &widths, layout));
            let b = render(StimFrame::new(&pads, &amps, &widths, layout));
            prop_assert_eq!(a, b);
        }

        #[test]
        fn test_special_anodes_never_listed((pads, amps, widths, anodes, _special) in frame_inputs()) {
            let layout = AnodeLayout { special_anodes: true, anodes: &anodes };
            let out = render(StimFrame::new(&pads, &amps, &widths, layout));
            let cmd = StimCommand::parse(&out).unwrap();
            for setting in cmd.pads.iter() {
                prop_assert!(!anodes.contains(&setting.pad));
                prop_assert_eq!(setting.role, PadRole::Cathode);
            }
        }
    }
}
