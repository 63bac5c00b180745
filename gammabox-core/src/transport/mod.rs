//! Outbound message scheduling
//!
//! The box accepts one command at a time and drops input that arrives too
//! quickly. Messages are queued with a bounded capacity and released by a
//! [`Pump`] at a fixed pace.

pub mod pump;
pub mod queue;

pub use pump::Pump;
pub use queue::{OutboundQueue, Priority, SendOutcome};
