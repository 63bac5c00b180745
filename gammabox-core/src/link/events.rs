//! Events that drive the link state machine

/// Events that can trigger link state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    // Lifecycle events
    /// A physical connection attempt started
    ConnectRequested,
    /// Transport opened successfully
    TransportOpened,
    /// Transport failed to open, or failed while in use
    TransportFailed,
    /// Host is shutting the link down
    Teardown,

    // Handshake events
    /// A valid acknowledgement arrived
    GreetingReceived,
    /// Handshake retries exhausted without an acknowledgement
    GreetingTimedOut,
}

impl LinkEvent {
    /// Check if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, LinkEvent::TransportFailed | LinkEvent::GreetingTimedOut)
    }
}
