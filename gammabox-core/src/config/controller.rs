//! Controller timing and capacity settings

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default modulation tick interval
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 100;

/// Default spacing between outbound messages
pub const DEFAULT_MESSAGE_DELAY_MS: u64 = 50;

/// Default outbound queue capacity
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10;

/// Timing and capacity knobs shared by the link, pump and combiner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ControllerConfig {
    /// Modulation tick interval
    pub update_interval_ms: u64,
    /// Minimum spacing between two outbound messages
    pub message_delay_ms: u64,
    /// Outbound queue capacity for normal-priority messages
    pub max_queue_size: usize,
    /// How long to wait for an acknowledgement after the handshake
    pub greeting_timeout_ms: u64,
    /// Handshake re-sends before giving up
    pub greeting_retries: u8,
    /// Silence after which a connected link is reported unhealthy
    pub heartbeat_timeout_ms: u64,
    /// Battery query period while connected, 0 disables polling
    pub battery_poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            message_delay_ms: DEFAULT_MESSAGE_DELAY_MS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            greeting_timeout_ms: 2000,
            greeting_retries: 3,
            heartbeat_timeout_ms: 10_000,
            battery_poll_interval_ms: 30_000,
        }
    }
}
