//! Link state machine definition
//!
//! The connection state is a pure function of the previous state and an
//! event. Side effects (queueing the handshake, tearing the transport down)
//! belong to the caller.

use super::events::LinkEvent;

/// Link states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// No transport, or the last attempt failed
    #[default]
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Handshake sent, waiting for an acknowledgement
    AwaitingGreeting,
    /// Handshake acknowledged
    Connected,
}

impl LinkState {
    /// Check if the box has acknowledged the handshake
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }

    /// Check if an acknowledgement would complete the handshake
    pub fn accepts_greeting(&self) -> bool {
        matches!(self, LinkState::AwaitingGreeting)
    }

    /// Check if the transport is expected to be open
    pub fn has_transport(&self) -> bool {
        matches!(self, LinkState::AwaitingGreeting | LinkState::Connected)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: LinkEvent) -> Self {
        use LinkEvent::*;
        use LinkState::*;

        match (self, event) {
            // Any state may start a fresh attempt
            (_, ConnectRequested) => Connecting,

            // Connecting transitions
            (Connecting, TransportOpened) => AwaitingGreeting,
            (Connecting, TransportFailed) => Disconnected,

            // AwaitingGreeting transitions
            (AwaitingGreeting, GreetingReceived) => Connected,
            (AwaitingGreeting, GreetingTimedOut) => Disconnected,
            (AwaitingGreeting, TransportFailed) => Disconnected,

            // Connected transitions
            (Connected, TransportFailed) => Disconnected,

            (_, Teardown) => Disconnected,

            // Default: stay in current state
            _ => self,
        }
    }
}
