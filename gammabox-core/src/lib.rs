//! Transport-agnostic core logic for the gamma box driver
//!
//! This crate contains everything between the pressure readings coming in
//! and the command lines going out, without touching a serial port:
//!
//! - Device configuration, registry and calibration baseline
//! - Link state machine (handshake, telemetry, heartbeat supervision)
//! - Outbound queue and rate-limited pump
//! - Modulation sources and the per-tick combiner
//!
//! Time is always injected as milliseconds since an arbitrary epoch, so every
//! component can be driven deterministically from tests.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod input;
pub mod link;
pub mod modulation;
pub mod transport;
