//! In-process gamma box emulator
//!
//! Answers the handshake, acknowledges every known command, reports a fixed
//! battery reading and ticks a heartbeat every few seconds once it has been
//! identified. Stimulation commands are decoded so tests and the demo can
//! inspect what the box would be doing.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

use gammabox_protocol::command::{BATTERY_QUERY, IDENTIFY, STIM_OFF, STIM_ON};
use gammabox_protocol::StimCommand;

use super::{LineSource, Transport};
use crate::error::HostError;

/// Port name reported by the emulator
pub const EMULATOR_PORT: &str = "emulator";

/// Battery report sent for `battery ?`
pub const BATTERY_REPLY: &str =
    "Re:[] battery *capacity=21 *voltage=363 *current=-9159 *temperature=2870";

const GREETING: &str = "Re:[] re-connection";
const OK: &str = "Re:[] ok";

/// Emulator behaviour
#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    /// Answer the identification command
    pub greet: bool,
    /// Interval between unsolicited heartbeats
    pub heartbeat_interval: Duration,
    /// How long the read half waits for a reply before reporting a timeout
    pub read_timeout: Duration,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            greet: true,
            heartbeat_interval: Duration::from_secs(3),
            read_timeout: Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Default)]
struct EmulatorState {
    identified_at: Option<Instant>,
    last_heartbeat: Option<Instant>,
    heartbeat_seq: u32,
    stimulating: bool,
    pads_qty: Option<u16>,
    frequency: Option<u32>,
    last_stim: Option<StimCommand>,
    received: Vec<String>,
    failed: bool,
}

fn lock(shared: &Mutex<EmulatorState>) -> MutexGuard<'_, EmulatorState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emulated box, used in place of a serial transport
pub struct EmulatedBox {
    options: EmulatorOptions,
    shared: Arc<Mutex<EmulatorState>>,
    replies: Sender<String>,
    reader: Option<EmulatorLines>,
}

impl EmulatedBox {
    pub fn new() -> Self {
        Self::with_options(EmulatorOptions::default())
    }

    pub fn with_options(options: EmulatorOptions) -> Self {
        let (replies, rx) = mpsc::channel();
        let shared = Arc::new(Mutex::new(EmulatorState::default()));
        let reader = EmulatorLines {
            rx,
            replies: replies.clone(),
            shared: shared.clone(),
            heartbeat_interval: options.heartbeat_interval,
            read_timeout: options.read_timeout,
        };
        Self {
            options,
            shared,
            replies,
            reader: Some(reader),
        }
    }

    /// Inspection handle that outlives the transport
    pub fn handle(&self) -> EmulatorHandle {
        EmulatorHandle {
            shared: self.shared.clone(),
        }
    }

    fn respond(&self, line: &str) -> Option<String> {
        let mut state = lock(&self.shared);
        state.received.push(line.to_string());

        if line == IDENTIFY {
            let now = Instant::now();
            state.identified_at = Some(now);
            state.last_heartbeat = Some(now);
            return self.options.greet.then(|| GREETING.to_string());
        }
        if line == BATTERY_QUERY {
            return Some(BATTERY_REPLY.to_string());
        }
        if line == STIM_ON || line == STIM_OFF {
            state.stimulating = line == STIM_ON;
            return Some(OK.to_string());
        }
        if let Some(qty) = line.strip_prefix("elec 1 *pads_qty ") {
            if let Ok(qty) = qty.trim().parse() {
                state.pads_qty = Some(qty);
                return Some(OK.to_string());
            }
        }
        if let Some(hz) = line.strip_prefix("freq ") {
            if let Ok(hz) = hz.trim().parse() {
                state.frequency = Some(hz);
                return Some(OK.to_string());
            }
        }
        if line.starts_with("velec") {
            if let Ok(cmd) = StimCommand::parse(line) {
                state.last_stim = Some(cmd);
                return Some(OK.to_string());
            }
        }
        Some(format!("(Emulator) unrecognized command: {}", line))
    }
}

impl Default for EmulatedBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for EmulatedBox {
    fn port_name(&self) -> &str {
        EMULATOR_PORT
    }

    fn write_line(&mut self, line: &str) -> Result<(), HostError> {
        if lock(&self.shared).failed {
            return Err(HostError::closed("emulator"));
        }
        debug!("Emulator received: {}", line);
        if let Some(reply) = self.respond(line) {
            // Reader already gone; nobody is listening
            let _ = self.replies.send(reply);
        }
        Ok(())
    }

    fn take_reader(&mut self) -> Result<Box<dyn LineSource>, HostError> {
        match self.reader.take() {
            Some(reader) => Ok(Box::new(reader)),
            None => Err(HostError::closed("emulator reader")),
        }
    }
}

/// Read half of the emulator
struct EmulatorLines {
    rx: Receiver<String>,
    replies: Sender<String>,
    shared: Arc<Mutex<EmulatorState>>,
    heartbeat_interval: Duration,
    read_timeout: Duration,
}

impl EmulatorLines {
    /// Queue a heartbeat if one is due
    fn tick(&self) -> Result<(), HostError> {
        let mut state = lock(&self.shared);
        if state.failed {
            return Err(HostError::closed("emulator"));
        }
        let now = Instant::now();
        if let Some(last) = state.last_heartbeat {
            if now.duration_since(last) >= self.heartbeat_interval {
                state.heartbeat_seq += 1;
                state.last_heartbeat = Some(now);
                let _ = self
                    .replies
                    .send(format!("[{}] tic *stim {}", state.heartbeat_seq, state.stimulating as u8));
            }
        }
        Ok(())
    }
}

impl LineSource for EmulatorLines {
    fn next_line(&mut self) -> Result<Option<String>, HostError> {
        self.tick()?;
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(HostError::closed("emulator")),
        }
    }
}

/// Shared view of the emulator's state
#[derive(Clone)]
pub struct EmulatorHandle {
    shared: Arc<Mutex<EmulatorState>>,
}

impl EmulatorHandle {
    /// Every command line received, in order
    pub fn received(&self) -> Vec<String> {
        lock(&self.shared).received.clone()
    }

    pub fn is_identified(&self) -> bool {
        lock(&self.shared).identified_at.is_some()
    }

    pub fn is_stimulating(&self) -> bool {
        lock(&self.shared).stimulating
    }

    pub fn pads_qty(&self) -> Option<u16> {
        lock(&self.shared).pads_qty
    }

    pub fn frequency(&self) -> Option<u32> {
        lock(&self.shared).frequency
    }

    /// Last decoded `velec` command
    pub fn last_stim(&self) -> Option<StimCommand> {
        lock(&self.shared).last_stim.clone()
    }

    pub fn heartbeats_sent(&self) -> u32 {
        lock(&self.shared).heartbeat_seq
    }

    /// Make both halves fail as if the cable was pulled
    pub fn fail(&self) {
        lock(&self.shared).failed = true;
    }
}
