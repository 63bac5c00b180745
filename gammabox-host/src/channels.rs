//! Channels between the reply reader thread and the controller
//!
//! Uses embassy-sync primitives over the std critical-section
//! implementation. Each link owns its own set, so several boxes can be
//! driven from one process.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

/// Replies buffered between reader and controller
pub const REPLY_CHANNEL_SIZE: usize = 32;

/// Longest reply line kept; longer lines are truncated
pub const MAX_REPLY_LEN: usize = 256;

/// One reply line, terminator stripped
pub type ReplyLine = heapless::String<MAX_REPLY_LEN>;

/// Reader-to-controller handoff for one link
pub struct LinkChannels {
    /// Reply lines from the box
    pub replies: Channel<CriticalSectionRawMutex, ReplyLine, REPLY_CHANNEL_SIZE>,
    /// Raised by the reader when the transport fails
    pub link_lost: Signal<CriticalSectionRawMutex, ()>,
}

impl LinkChannels {
    pub const fn new() -> Self {
        Self {
            replies: Channel::new(),
            link_lost: Signal::new(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Drop anything left over from a previous connection
    pub fn reset(&self) {
        while self.replies.try_receive().is_ok() {}
        self.link_lost.reset();
    }
}

impl Default for LinkChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot "hand tracking is ready" signal
///
/// Sources that need hand tracking are held back until this fires.
pub type HandTrackingSignal = Signal<CriticalSectionRawMutex, ()>;
