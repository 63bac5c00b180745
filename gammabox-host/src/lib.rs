//! Host runtime for the gamma box
//!
//! Connects to a box over a serial port (or the in-process emulator), runs
//! the handshake, keeps telemetry current and streams combined stimulation
//! commands at a bounded rate. The device-independent logic lives in
//! `gammabox-core`; this crate adds threads, I/O, files and logging.

#![deny(unsafe_code)]

pub mod channels;
pub mod config;
pub mod controller;
pub mod error;
pub mod feed;
pub mod history;
pub mod scan;
pub mod tasks;
pub mod transport;

pub use controller::BoxController;
pub use error::HostError;
