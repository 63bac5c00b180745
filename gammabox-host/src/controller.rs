//! Gamma box controller
//!
//! Owns one link to a box and runs it from a single frame loop:
//!
//! 1. Drain replies queued by the reader thread
//! 2. React to transport loss
//! 3. Advance handshake and battery timers
//! 4. Admit sources that were waiting for hand tracking
//! 5. Tick the combiner every `update_interval_ms` while connected
//! 6. Release at most one queued command per `message_delay_ms`
//!
//! Time is passed in by the caller, so the loop can be driven by a real
//! clock or by a test.

use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, trace, warn};

use gammabox_core::config::{CalibrationBaseline, ConfigError, ControllerConfig, DeviceConfig};
use gammabox_core::input::HandPressure;
use gammabox_core::link::{Connection, ConnectionSnapshot, LinkAction, LinkState, ReplyOutcome};
use gammabox_core::modulation::{Combiner, ModulationSource, Subscription, Unsubscription};
use gammabox_core::transport::{Priority, Pump, SendOutcome};
use gammabox_protocol::command::STIM_OFF;
use gammabox_protocol::{single_pad, Command, CommandString};

use crate::channels::{HandTrackingSignal, LinkChannels};
use crate::config::load_calibration;
use crate::error::HostError;
use crate::history::{Direction, MessageHistory};
use crate::tasks::{spawn_reader, ReaderHandle};
use crate::transport::{SerialSettings, SerialTransport, Transport};

/// Drives one gamma box
pub struct BoxController {
    device: DeviceConfig,
    settings: ControllerConfig,
    combiner: Combiner,
    link: Connection,
    pump: Pump,
    history: MessageHistory,
    channels: Arc<LinkChannels>,
    transport: Option<Box<dyn Transport>>,
    reader: Option<ReaderHandle>,
    /// Sources waiting for hand tracking
    deferred: Vec<Box<dyn ModulationSource>>,
    hand_tracking: Arc<HandTrackingSignal>,
    hand_tracking_ready: bool,
    next_tick_ms: Option<u64>,
    now_ms: u64,
}

impl BoxController {
    pub fn new(
        device: DeviceConfig,
        settings: ControllerConfig,
        baseline: CalibrationBaseline,
    ) -> Result<Self, HostError> {
        let combiner = Combiner::new(device.clone(), baseline).map_err(HostError::Baseline)?;
        Ok(Self {
            link: Connection::new(&device, &settings),
            pump: Pump::new(settings.max_queue_size, settings.message_delay_ms),
            combiner,
            device,
            settings,
            history: MessageHistory::new(),
            channels: LinkChannels::shared(),
            transport: None,
            reader: None,
            deferred: Vec::new(),
            hand_tracking: Arc::new(HandTrackingSignal::new()),
            hand_tracking_ready: false,
            next_tick_ms: None,
            now_ms: 0,
        })
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// A transport is attached
    pub fn is_transport_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn snapshot(&self, now_ms: u64) -> ConnectionSnapshot {
        self.link.snapshot(now_ms)
    }

    /// Commands waiting for their send slot
    pub fn pending_messages(&self) -> usize {
        self.pump.pending()
    }

    /// Normal-priority commands dropped on a full queue
    pub fn dropped_messages(&self) -> u32 {
        self.pump.queue().dropped_count()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &str> {
        self.combiner.names()
    }

    /// Sources held back until hand tracking is ready
    pub fn deferred_sources(&self) -> impl Iterator<Item = &str> {
        self.deferred.iter().map(|s| s.name())
    }

    /// Signal for the hand tracker to raise once it produces data
    pub fn hand_tracking_signal(&self) -> Arc<HandTrackingSignal> {
        self.hand_tracking.clone()
    }

    /// Open a serial port and connect to the box behind it
    pub fn open_serial(
        &mut self,
        port_name: &str,
        serial: &SerialSettings,
        now_ms: u64,
    ) -> Result<(), HostError> {
        match SerialTransport::open(port_name, serial) {
            Ok(transport) => self.connect(Box::new(transport), now_ms),
            Err(e) => {
                self.shutdown();
                self.link.begin_connect(port_name);
                self.link.on_connection_event(false, now_ms);
                error!("Could not open {}: {}", port_name, e);
                Err(e)
            }
        }
    }

    /// Attach a transport and start the handshake
    pub fn connect(&mut self, mut transport: Box<dyn Transport>, now_ms: u64) -> Result<(), HostError> {
        self.shutdown();
        self.now_ms = now_ms;

        let port = transport.port_name().to_string();
        info!("Connecting to gamma box on {}", port);
        self.link.begin_connect(&port);
        self.channels.reset();

        let reader = match transport
            .take_reader()
            .and_then(|source| spawn_reader(source, self.channels.clone()))
        {
            Ok(reader) => reader,
            Err(e) => {
                error!("Could not start reading from {}: {}", port, e);
                self.link.on_connection_event(false, now_ms);
                return Err(e);
            }
        };
        self.reader = Some(reader);
        self.transport = Some(transport);

        if self.link.on_connection_event(true, now_ms) {
            self.queue_handshake();
        }
        Ok(())
    }

    /// Add a modulation source
    ///
    /// Sources that need hand tracking wait until the tracker signals it is
    /// ready. The first active source switches stimulation on.
    pub fn subscribe(&mut self, source: Box<dyn ModulationSource>) -> Result<(), HostError> {
        let waits = source.needs_hand_tracking() && source.is_compatible_with(&self.device);
        if waits && !self.hand_tracking_open() {
            if self.deferred.iter().any(|s| s.name() == source.name()) {
                warn!("{} is already subscribed", source.name());
            } else {
                info!("Deferring {} until hand tracking is ready", source.name());
                self.deferred.push(source);
            }
            return Ok(());
        }
        self.attach(source)
    }

    /// Remove a modulation source; the last one switches stimulation off
    pub fn unsubscribe(&mut self, name: &str) {
        self.deferred.retain(|s| s.name() != name);
        match self.combiner.unsubscribe(name) {
            Unsubscription::DisableStimulation => {
                info!("Unsubscribed {}, stimulation off", name);
                self.send_command(Command::Stimulation(false), Priority::Bypass);
            }
            Unsubscription::Removed => info!("Unsubscribed {}", name),
            Unsubscription::NotSubscribed => debug!("{} was not subscribed", name),
        }
    }

    /// Replace the calibration baseline from a file
    ///
    /// On error the current baseline stays active.
    pub fn load_calibration(&mut self, path: &Path) -> Result<(), HostError> {
        let baseline = load_calibration(path, &self.device)?;
        self.set_baseline(baseline)
    }

    pub fn set_baseline(&mut self, baseline: CalibrationBaseline) -> Result<(), HostError> {
        self.combiner
            .set_baseline(baseline)
            .map_err(HostError::Baseline)
    }

    pub fn baseline(&self) -> &CalibrationBaseline {
        self.combiner.baseline()
    }

    /// Stimulate one pad (zero-based) on its own, for calibration
    pub fn pulse_pad(&mut self, pad: usize, amp: f32, width: u32) -> Result<(), HostError> {
        if !self.link.is_connected() {
            return Err(HostError::NotConnected);
        }
        if !(0.0..=self.device.max_amp()).contains(&amp) {
            return Err(HostError::Config(ConfigError::InvalidRange("amplitude")));
        }
        if width < self.device.min_width() || width > self.device.max_width() {
            return Err(HostError::Config(ConfigError::InvalidRange("width")));
        }
        let line = single_pad(
            self.device.num_pads(),
            pad,
            amp,
            width,
            self.device.anode_layout(),
        )?;
        info!("Pulsing pad {} at {} / {}us", pad + 1, amp, width);
        self.enqueue(line, Priority::Bypass);
        Ok(())
    }

    /// Switch stimulation on or off outside the subscription flow
    pub fn set_stimulation(&mut self, on: bool) -> Result<(), HostError> {
        if !self.link.is_connected() {
            return Err(HostError::NotConnected);
        }
        self.send_command(Command::Stimulation(on), Priority::Bypass);
        Ok(())
    }

    /// Run one frame
    pub fn update(&mut self, now_ms: u64, pressure: &HandPressure) {
        self.now_ms = now_ms;
        self.drain_replies(now_ms);

        if self.channels.link_lost.try_take().is_some() {
            self.transport_failed(now_ms);
        }

        if let Some(action) = self.link.poll(now_ms) {
            self.run_action(action);
        }

        self.admit_deferred();

        if self.link.is_connected() && self.tick_due(now_ms) {
            self.tick(pressure, now_ms);
        }

        self.pump_messages(now_ms);
    }

    /// Switch stimulation off and close the transport
    pub fn shutdown(&mut self) {
        if self.link.teardown() {
            if let Some(transport) = self.transport.as_mut() {
                // Bypasses the pump; the queue is about to be discarded
                match transport.write_line(STIM_OFF) {
                    Ok(()) => {
                        info!("Stimulation off");
                        self.history.record(self.now_ms, Direction::Sent, STIM_OFF);
                    }
                    Err(e) => warn!("Could not switch stimulation off: {}", e),
                }
            }
        }
        if self.transport.is_some() {
            info!("Disconnected from gamma box");
        }
        self.close_transport();
    }

    fn attach(&mut self, source: Box<dyn ModulationSource>) -> Result<(), HostError> {
        let name = source.name().to_string();
        let subscription = self.combiner.subscribe(source).map_err(|e| {
            warn!("{}", e);
            HostError::from(e)
        })?;
        match subscription {
            Subscription::EnableStimulation => {
                info!("Subscribed {}, stimulation on", name);
                if self.link.is_connected() {
                    self.send_command(Command::Stimulation(true), Priority::Bypass);
                }
            }
            Subscription::Added => info!("Subscribed {}", name),
            Subscription::AlreadySubscribed => warn!("{} is already subscribed", name),
        }
        Ok(())
    }

    fn hand_tracking_open(&mut self) -> bool {
        if !self.hand_tracking_ready && self.hand_tracking.try_take().is_some() {
            info!("Hand tracking ready");
            self.hand_tracking_ready = true;
        }
        self.hand_tracking_ready
    }

    fn admit_deferred(&mut self) {
        if self.deferred.is_empty() || !self.hand_tracking_open() {
            return;
        }
        for source in std::mem::take(&mut self.deferred) {
            // Compatibility was checked when the source was deferred
            let _ = self.attach(source);
        }
    }

    fn queue_handshake(&mut self) {
        for command in self.link.handshake() {
            self.send_command(command, Priority::Normal);
        }
        self.combiner.note_frequency_sent(self.device.base_freq());
    }

    fn drain_replies(&mut self, now_ms: u64) {
        while let Ok(line) = self.channels.replies.try_receive() {
            self.history.record(now_ms, Direction::Received, &line);
            debug!("RX: {}", line);

            match self.link.handle_reply(&line, now_ms) {
                ReplyOutcome::Connected(kind) => {
                    info!(
                        "Gamma box connected on {} ({})",
                        self.link.port().unwrap_or("?"),
                        kind.as_str()
                    );
                    self.next_tick_ms = None;
                    if self.combiner.subscriber_count() > 0 {
                        self.send_command(Command::Stimulation(true), Priority::Bypass);
                    }
                }
                ReplyOutcome::Acknowledged(_) => {}
                ReplyOutcome::Telemetry => {
                    let t = self.link.telemetry();
                    debug!(
                        "Battery {:?}% {:?}V {:?}A {:?}C",
                        t.capacity, t.voltage, t.current, t.temperature
                    );
                }
                ReplyOutcome::Heartbeat(seq) => trace!("Heartbeat {}", seq),
                ReplyOutcome::Malformed(e) => warn!("Ignoring battery report '{}': {}", line, e),
                ReplyOutcome::Unrecognized => warn!("Unrecognized reply: {}", line),
            }
        }
    }

    fn run_action(&mut self, action: LinkAction) {
        match action {
            LinkAction::ResendHandshake { attempt } => {
                warn!("No greeting from gamma box, resending handshake (attempt {})", attempt);
                self.queue_handshake();
            }
            LinkAction::GreetingTimedOut => {
                error!(
                    "Gamma box on {} did not answer the handshake",
                    self.link.port().unwrap_or("?")
                );
                self.close_transport();
            }
            LinkAction::QueryBattery => self.send_command(Command::BatteryQuery, Priority::Normal),
        }
    }

    fn tick_due(&mut self, now_ms: u64) -> bool {
        match self.next_tick_ms {
            Some(due) if now_ms < due => false,
            _ => {
                self.next_tick_ms = Some(now_ms + self.settings.update_interval_ms);
                true
            }
        }
    }

    fn tick(&mut self, pressure: &HandPressure, now_ms: u64) {
        match self.combiner.tick(pressure, now_ms) {
            Ok(Some(output)) => {
                self.enqueue(output.stimulation, Priority::Normal);
                if let Some(frequency) = output.frequency {
                    self.enqueue(frequency, Priority::Normal);
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Modulation tick failed: {}; resetting pads", e);
                self.send_command(Command::ResetPads, Priority::Bypass);
            }
        }
    }

    fn send_command(&mut self, command: Command<'_>, priority: Priority) {
        match command.encode() {
            Ok(line) => {
                let priority = if command.is_urgent() {
                    Priority::Bypass
                } else {
                    priority
                };
                self.enqueue(line, priority);
            }
            Err(e) => error!("Could not encode command: {}", e),
        }
    }

    fn enqueue(&mut self, line: CommandString, priority: Priority) -> SendOutcome {
        let text = line.clone();
        let outcome = self.pump.send(line, priority);
        if outcome == SendOutcome::Dropped {
            warn!("Outbound queue full, dropping '{}'", text);
        }
        outcome
    }

    fn pump_messages(&mut self, now_ms: u64) {
        if self.transport.is_none() {
            return;
        }
        if let Some(line) = self.pump.poll(now_ms) {
            self.write(&line, now_ms);
        }
    }

    fn write(&mut self, line: &str, now_ms: u64) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match transport.write_line(line) {
            Ok(()) => {
                debug!("TX: {}", line);
                self.history.record(now_ms, Direction::Sent, line);
            }
            Err(e) => {
                error!("Write to gamma box failed: {}", e);
                self.transport_failed(now_ms);
            }
        }
    }

    fn transport_failed(&mut self, now_ms: u64) {
        warn!(
            "Lost gamma box on {}",
            self.link.port().unwrap_or("?")
        );
        self.link.on_connection_event(false, now_ms);
        self.close_transport();
    }

    fn close_transport(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
        }
        self.transport = None;
        self.pump.clear();
        self.next_tick_ms = None;
    }
}

impl Drop for BoxController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
