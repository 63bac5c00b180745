//! Link to the box
//!
//! Connection lifecycle, handshake and telemetry. The state machine is
//! explicit, finite, and deterministic; [`Connection`] wraps it with the
//! timers and telemetry the host needs.

pub mod connection;
pub mod events;
pub mod health;
pub mod machine;

pub use connection::{Connection, ConnectionSnapshot, LinkAction, ReplyOutcome, TelemetryAge};
pub use events::LinkEvent;
pub use health::LinkMonitor;
pub use machine::LinkState;
