//! Connection lifecycle, handshake supervision and telemetry
//!
//! [`Connection`] owns the only mutable copy of the link status. The host
//! feeds it transport events, reply lines and the current time; it answers
//! with outcomes and actions the host carries out.

use alloc::string::{String, ToString};
use core::fmt;

use gammabox_protocol::{AckKind, Command, Reply, ReplyError, Telemetry};

use super::events::LinkEvent;
use super::health::LinkMonitor;
use super::machine::LinkState;
use crate::config::{ControllerConfig, DeviceConfig};

/// What a reply line did to the link
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyOutcome {
    /// Acknowledgement completed the handshake
    Connected(AckKind),
    /// Acknowledgement of an ordinary command
    Acknowledged(AckKind),
    /// Battery report merged into the telemetry
    Telemetry,
    /// Heartbeat with its sequence number
    Heartbeat(u32),
    /// Battery report with an unparseable number; telemetry unchanged
    Malformed(ReplyError),
    /// Line not understood
    Unrecognized,
}

/// Work the host has to do after [`Connection::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkAction {
    /// Queue the handshake again; `attempt` counts from 1
    ResendHandshake { attempt: u8 },
    /// Retries exhausted; the link is down and the transport should close
    GreetingTimedOut,
    /// Queue a battery query
    QueryBattery,
}

/// Coarse age of the last telemetry update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryAge {
    JustNow,
    Seconds(u64),
    Minutes(u64),
    Hours(u64),
    Days(u64),
}

impl TelemetryAge {
    pub fn from_millis(ms: u64) -> Self {
        let secs = ms / 1000;
        match secs {
            0 => Self::JustNow,
            1..=59 => Self::Seconds(secs),
            60..=3599 => Self::Minutes(secs / 60),
            3600..=86_399 => Self::Hours(secs / 3600),
            _ => Self::Days(secs / 86_400),
        }
    }
}

impl fmt::Display for TelemetryAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JustNow => write!(f, "just now"),
            Self::Seconds(n) => write!(f, ">{} second(s) ago", n),
            Self::Minutes(n) => write!(f, ">{} minute(s) ago", n),
            Self::Hours(n) => write!(f, ">{} hour(s) ago", n),
            Self::Days(n) => write!(f, ">{} day(s) ago", n),
        }
    }
}

/// Read-only view of the link for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub port: Option<String>,
    pub state: LinkState,
    pub is_connected: bool,
    pub has_received_greeting: bool,
    /// Battery capacity as sent by the box
    pub battery: Option<String>,
    pub voltage: Option<String>,
    pub current: Option<String>,
    pub temperature: Option<String>,
    pub telemetry_age: Option<TelemetryAge>,
    pub link_healthy: bool,
}

/// Link status owner
#[derive(Debug, Clone)]
pub struct Connection {
    settings: ControllerConfig,
    num_pads: u16,
    base_freq: u32,
    state: LinkState,
    port: Option<String>,
    greeting: Option<AckKind>,
    telemetry: Telemetry,
    telemetry_at_ms: Option<u64>,
    /// Handshake deadline while awaiting the greeting
    greeting_deadline_ms: Option<u64>,
    handshake_attempts: u8,
    next_battery_poll_ms: Option<u64>,
    last_poll_ms: Option<u64>,
    monitor: LinkMonitor,
}

impl Connection {
    pub fn new(device: &DeviceConfig, settings: &ControllerConfig) -> Self {
        Self {
            settings: *settings,
            num_pads: device.num_pads() as u16,
            base_freq: device.base_freq(),
            state: LinkState::Disconnected,
            port: None,
            greeting: None,
            telemetry: Telemetry::default(),
            telemetry_at_ms: None,
            greeting_deadline_ms: None,
            handshake_attempts: 0,
            next_battery_poll_ms: None,
            last_poll_ms: None,
            monitor: LinkMonitor::new(settings.heartbeat_timeout_ms),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn has_received_greeting(&self) -> bool {
        self.greeting.is_some()
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Link is connected and has not gone silent
    pub fn is_link_healthy(&self) -> bool {
        self.is_connected() && self.monitor.is_link_healthy()
    }

    /// Identification sequence sent after the transport opens
    pub fn handshake(&self) -> [Command<'static>; 4] {
        [
            Command::Identify,
            Command::DeclarePads(self.num_pads),
            Command::BatteryQuery,
            Command::Frequency(self.base_freq),
        ]
    }

    /// A physical connection attempt to `port` is starting
    pub fn begin_connect(&mut self, port: &str) {
        self.port = Some(port.to_string());
        self.greeting = None;
        self.greeting_deadline_ms = None;
        self.apply(LinkEvent::ConnectRequested);
    }

    /// Report the result of opening the transport
    ///
    /// Returns `true` when the caller should queue the [`handshake`](Self::handshake).
    /// A failed event forces the link down and re-arms greeting detection.
    pub fn on_connection_event(&mut self, opened: bool, now_ms: u64) -> bool {
        if opened {
            self.apply(LinkEvent::TransportOpened);
            if self.state.accepts_greeting() {
                self.greeting = None;
                self.handshake_attempts = 1;
                self.greeting_deadline_ms = Some(now_ms + self.settings.greeting_timeout_ms);
                self.monitor.reset();
                return true;
            }
            false
        } else {
            self.apply(LinkEvent::TransportFailed);
            self.greeting = None;
            self.greeting_deadline_ms = None;
            self.next_battery_poll_ms = None;
            false
        }
    }

    /// Handle one reply line from the box
    pub fn handle_reply(&mut self, line: &str, now_ms: u64) -> ReplyOutcome {
        let reply = match Reply::parse(line) {
            Ok(reply) => reply,
            Err(e) => {
                self.monitor.reply_received();
                return ReplyOutcome::Malformed(e);
            }
        };

        match reply {
            Reply::Heartbeat { seq } => {
                self.monitor.heartbeat_received(seq);
                return ReplyOutcome::Heartbeat(seq);
            }
            Reply::Unrecognized(_) => {
                self.monitor.reply_received();
                return ReplyOutcome::Unrecognized;
            }
            _ => self.monitor.reply_received(),
        }

        match reply {
            Reply::Ack(kind) if self.state.accepts_greeting() && self.greeting.is_none() => {
                self.greeting = Some(kind);
                self.greeting_deadline_ms = None;
                self.apply(LinkEvent::GreetingReceived);
                if self.settings.battery_poll_interval_ms > 0 {
                    self.next_battery_poll_ms =
                        Some(now_ms + self.settings.battery_poll_interval_ms);
                }
                ReplyOutcome::Connected(kind)
            }
            Reply::Ack(kind) => ReplyOutcome::Acknowledged(kind),
            Reply::Battery(update) => {
                self.telemetry.merge(&update);
                self.telemetry_at_ms = Some(now_ms);
                ReplyOutcome::Telemetry
            }
            Reply::Heartbeat { seq } => ReplyOutcome::Heartbeat(seq),
            Reply::Unrecognized(_) => ReplyOutcome::Unrecognized,
        }
    }

    /// Advance timers
    ///
    /// Call once per frame. At most one action is returned per call.
    pub fn poll(&mut self, now_ms: u64) -> Option<LinkAction> {
        let delta = self
            .last_poll_ms
            .map_or(0, |last| now_ms.saturating_sub(last));
        self.last_poll_ms = Some(now_ms);
        if self.is_connected() {
            self.monitor.update_time(delta);
        }

        if let Some(deadline) = self.greeting_deadline_ms {
            if self.state.accepts_greeting() && now_ms >= deadline {
                if self.handshake_attempts <= self.settings.greeting_retries {
                    self.handshake_attempts += 1;
                    self.greeting_deadline_ms = Some(now_ms + self.settings.greeting_timeout_ms);
                    return Some(LinkAction::ResendHandshake {
                        attempt: self.handshake_attempts,
                    });
                }
                self.greeting_deadline_ms = None;
                self.apply(LinkEvent::GreetingTimedOut);
                return Some(LinkAction::GreetingTimedOut);
            }
        }

        if let Some(due) = self.next_battery_poll_ms {
            if self.is_connected() && now_ms >= due {
                self.next_battery_poll_ms = Some(now_ms + self.settings.battery_poll_interval_ms);
                return Some(LinkAction::QueryBattery);
            }
        }

        None
    }

    /// Shut the link down
    ///
    /// Returns `true` if the transport was live, in which case the caller
    /// sends `stim off` directly before closing it.
    pub fn teardown(&mut self) -> bool {
        let had_transport = self.state.has_transport();
        self.apply(LinkEvent::Teardown);
        self.greeting = None;
        self.greeting_deadline_ms = None;
        self.next_battery_poll_ms = None;
        had_transport
    }

    pub fn snapshot(&self, now_ms: u64) -> ConnectionSnapshot {
        ConnectionSnapshot {
            port: self.port.clone(),
            state: self.state,
            is_connected: self.is_connected(),
            has_received_greeting: self.has_received_greeting(),
            battery: self.telemetry.capacity.map(|v| v.to_string()),
            voltage: self.telemetry.voltage.map(|v| v.to_string()),
            current: self.telemetry.current.map(|v| v.to_string()),
            temperature: self.telemetry.temperature.map(|v| v.to_string()),
            telemetry_age: self
                .telemetry_at_ms
                .map(|at| TelemetryAge::from_millis(now_ms.saturating_sub(at))),
            link_healthy: self.is_link_healthy(),
        }
    }

    fn apply(&mut self, event: LinkEvent) {
        self.state = self.state.transition(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::device::tests::{glove, strip};
    use std::format;

    fn settings() -> ControllerConfig {
        ControllerConfig {
            greeting_timeout_ms: 1000,
            greeting_retries: 2,
            heartbeat_timeout_ms: 5000,
            battery_poll_interval_ms: 10_000,
            ..ControllerConfig::default()
        }
    }

    fn awaiting() -> Connection {
        let mut link = Connection::new(&glove(), &settings());
        link.begin_connect("/dev/ttyUSB0");
        assert_eq!(link.state(), LinkState::Connecting);
        assert!(link.on_connection_event(true, 0));
        assert_eq!(link.state(), LinkState::AwaitingGreeting);
        link
    }

    #[test]
    fn test_handshake_sequence() {
        let link = Connection::new(&glove(), &settings());
        let lines: std::vec::Vec<_> = link
            .handshake()
            .iter()
            .map(|c| c.encode().unwrap())
            .collect();
        assert_eq!(lines[0].as_str(), "iam TACTILITY");
        assert_eq!(lines[1].as_str(), "elec 1 *pads_qty 32");
        assert_eq!(lines[2].as_str(), "battery ?");
        assert_eq!(lines[3].as_str(), "freq 50");
    }

    #[test]
    fn test_ok_completes_handshake() {
        let mut link = awaiting();
        assert_eq!(
            link.handle_reply("Re:[] ok\r", 10),
            ReplyOutcome::Connected(AckKind::Ok)
        );
        assert!(link.is_connected());
        assert!(link.has_received_greeting());
    }

    #[test]
    fn test_garbage_does_not_complete_handshake() {
        let mut link = awaiting();
        assert_eq!(link.handle_reply("foo\r", 10), ReplyOutcome::Unrecognized);
        assert_eq!(link.state(), LinkState::AwaitingGreeting);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_greeting_requires_open_transport() {
        let mut link = Connection::new(&glove(), &settings());
        link.begin_connect("COM3");
        assert_eq!(
            link.handle_reply("Re:[] new connection", 0),
            ReplyOutcome::Acknowledged(AckKind::NewConnection)
        );
        assert!(!link.is_connected());
    }

    #[test]
    fn test_later_replies_keep_connection() {
        let mut link = awaiting();
        link.handle_reply("Re:[] re-connection", 5);
        assert_eq!(
            link.handle_reply("Re:[] ok", 6),
            ReplyOutcome::Acknowledged(AckKind::Ok)
        );
        link.handle_reply("nonsense", 7);
        assert!(link.is_connected());
    }

    #[test]
    fn test_failed_event_rearms_greeting() {
        let mut link = awaiting();
        link.handle_reply("Re:[] ok", 5);
        assert!(!link.on_connection_event(false, 6));
        assert!(!link.is_connected());
        assert!(!link.has_received_greeting());

        link.begin_connect("/dev/ttyUSB0");
        assert!(link.on_connection_event(true, 10));
        assert_eq!(
            link.handle_reply("Re:[] re-connection", 11),
            ReplyOutcome::Connected(AckKind::Reconnection)
        );
    }

    #[test]
    fn test_telemetry_updates_in_any_state() {
        let mut link = awaiting();
        link.handle_reply(
            "Re:[] battery *capacity=21 *voltage=363 *current=-9159 *temperature=2870",
            100,
        );
        link.handle_reply("Re:[] ok", 150);
        link.handle_reply("Re:[] battery *capacity=20", 3100);

        let snap = link.snapshot(3500);
        assert_eq!(snap.battery.as_deref(), Some("20"));
        assert_eq!(snap.voltage.as_deref(), Some("3.63"));
        assert_eq!(snap.current.as_deref(), Some("-91.59"));
        assert_eq!(snap.temperature.as_deref(), Some("28.7"));
        assert_eq!(snap.telemetry_age, Some(TelemetryAge::JustNow));
        assert_eq!(snap.port.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_malformed_telemetry_leaves_values() {
        let mut link = awaiting();
        link.handle_reply("Re:[] battery *capacity=50", 0);
        assert_eq!(
            link.handle_reply("Re:[] battery *capacity=high", 1),
            ReplyOutcome::Malformed(ReplyError::MalformedNumber)
        );
        assert_eq!(link.telemetry().capacity, Some(50.0));
    }

    #[test]
    fn test_greeting_retries_then_gives_up() {
        let mut link = awaiting();
        assert_eq!(link.poll(999), None);
        assert_eq!(
            link.poll(1000),
            Some(LinkAction::ResendHandshake { attempt: 2 })
        );
        assert_eq!(
            link.poll(2000),
            Some(LinkAction::ResendHandshake { attempt: 3 })
        );
        assert_eq!(link.poll(3000), Some(LinkAction::GreetingTimedOut));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.poll(10_000), None);
    }

    #[test]
    fn test_battery_polling_while_connected() {
        let mut link = awaiting();
        link.handle_reply("Re:[] ok", 500);
        assert_eq!(link.poll(5000), None);
        assert_eq!(link.poll(10_500), Some(LinkAction::QueryBattery));
        assert_eq!(link.poll(10_600), None);
        assert_eq!(link.poll(20_500), Some(LinkAction::QueryBattery));
    }

    #[test]
    fn test_heartbeat_supervision() {
        let mut link = awaiting();
        link.handle_reply("Re:[] ok", 0);
        link.poll(0);
        link.poll(4000);
        assert!(link.snapshot(4000).link_healthy);
        link.poll(6000);
        assert!(!link.snapshot(6000).link_healthy);
        assert_eq!(link.handle_reply("[3] tic *stim 20", 6100), ReplyOutcome::Heartbeat(3));
        assert!(link.is_link_healthy());
    }

    #[test]
    fn test_teardown_reports_live_transport() {
        let mut link = awaiting();
        assert!(link.teardown());
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(!link.teardown());
    }

    #[test]
    fn test_telemetry_age_formatting() {
        assert_eq!(format!("{}", TelemetryAge::from_millis(400)), "just now");
        assert_eq!(format!("{}", TelemetryAge::from_millis(3_500)), ">3 second(s) ago");
        assert_eq!(format!("{}", TelemetryAge::from_millis(125_000)), ">2 minute(s) ago");
        assert_eq!(format!("{}", TelemetryAge::from_millis(7_200_000)), ">2 hour(s) ago");
        assert_eq!(format!("{}", TelemetryAge::from_millis(90_000_000)), ">1 day(s) ago");
    }

    #[test]
    fn test_handshake_declares_device_pads() {
        let link = Connection::new(&strip(4, &[]), &settings());
        assert_eq!(link.handshake()[1], Command::DeclarePads(4));
        assert_eq!(link.handshake()[3], Command::Frequency(30));
    }
}
