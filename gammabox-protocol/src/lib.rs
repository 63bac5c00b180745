//! Gamma Box Serial Protocol
//!
//! This crate defines the text protocol spoken between the host and the
//! gamma box electro-tactile stimulator. Every command is a single ASCII line;
//! the transport appends the carriage-return terminator.
//!
//! # Protocol Overview
//!
//! ```text
//! host -> box   iam TACTILITY
//! host -> box   elec 1 *pads_qty 32
//! host -> box   battery ?
//! host -> box   freq 50
//! box  -> host  Re:[] new connection
//! box  -> host  Re:[] battery *capacity=87 *voltage=391 *current=-120 *temperature=2790
//! host -> box   velec 11 *special_anodes 1 *name test *elec 1 *pads 1=C,9=C *amp 1=2.5,9=2.5 *width 1=200,9=200 *selected 1 *sync 0
//! box  -> host  [42] tic *stim 20
//! ```
//!
//! Encoding is deterministic and stateless. Decoding never panics: anything
//! that is not an acknowledgement, battery report or heartbeat comes back as
//! [`Reply::Unrecognized`].

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod command;
pub mod reply;
pub mod stim;

pub use command::{
    Command, CommandString, EncodeError, LINE_TERMINATOR, MAX_COMMAND_LEN, MAX_PADS,
};
pub use reply::{
    is_acknowledgement, strip_line_ending, AckKind, Reply, ReplyError, Telemetry, BATTERY_PREFIX,
};
pub use stim::{
    single_pad, AnodeLayout, PadRole, PadSetting, StimCommand, StimFrame, StimParseError,
};
