//! Inbound reply decoding.
//!
//! The box answers with short text lines. Three shapes carry meaning:
//!
//! - acknowledgements: exactly `Re:[] new connection`, `Re:[] re-connection`
//!   or `Re:[] ok`
//! - battery reports: `Re:[] battery ` followed by `*key=value` pairs
//! - heartbeats: `[<seq>] tic *stim <n>`
//!
//! Everything else is [`Reply::Unrecognized`].

/// Prefix of every battery report
pub const BATTERY_PREFIX: &str = "Re:[] battery ";

const ACK_NEW_CONNECTION: &str = "Re:[] new connection";
const ACK_RECONNECTION: &str = "Re:[] re-connection";
const ACK_OK: &str = "Re:[] ok";

/// Which acknowledgement the box sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckKind {
    NewConnection,
    Reconnection,
    Ok,
}

impl AckKind {
    /// Wire text of this acknowledgement
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewConnection => ACK_NEW_CONNECTION,
            Self::Reconnection => ACK_RECONNECTION,
            Self::Ok => ACK_OK,
        }
    }
}

/// Errors that can occur while decoding a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyError {
    /// A known telemetry key is followed by something that is not a number
    MalformedNumber,
}

impl core::fmt::Display for ReplyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MalformedNumber => write!(f, "malformed number in battery report"),
        }
    }
}

/// Battery telemetry in engineering units
///
/// `voltage`, `current` and `temperature` arrive in hundredths and are
/// scaled here; `capacity` is kept as sent. Keys absent from a report are
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub capacity: Option<f32>,
    pub voltage: Option<f32>,
    pub current: Option<f32>,
    pub temperature: Option<f32>,
}

impl Telemetry {
    /// Parse the body of a battery report (text after [`BATTERY_PREFIX`])
    pub fn parse(body: &str) -> Result<Self, ReplyError> {
        let mut telemetry = Telemetry::default();
        for field in body.split('*').skip(1) {
            let Some((key, rest)) = field.split_once('=') else {
                continue;
            };
            let slot = match key {
                "capacity" => &mut telemetry.capacity,
                "voltage" => &mut telemetry.voltage,
                "current" => &mut telemetry.current,
                "temperature" => &mut telemetry.temperature,
                _ => continue,
            };
            let raw: f32 = leading_number(rest)
                .and_then(|n| n.parse().ok())
                .ok_or(ReplyError::MalformedNumber)?;
            *slot = Some(if key == "capacity" { raw } else { raw / 100.0 });
        }
        Ok(telemetry)
    }

    /// Overwrite the fields present in `update`, keep the rest
    pub fn merge(&mut self, update: &Telemetry) {
        self.capacity = update.capacity.or(self.capacity);
        self.voltage = update.voltage.or(self.voltage);
        self.current = update.current.or(self.current);
        self.temperature = update.temperature.or(self.temperature);
    }

    pub fn is_empty(&self) -> bool {
        self.capacity.is_none()
            && self.voltage.is_none()
            && self.current.is_none()
            && self.temperature.is_none()
    }
}

/// Signed decimal prefix of `text`: `-?\d+(\.\d+)?`
fn leading_number(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut end = usize::from(bytes.first() == Some(&b'-'));
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == int_start {
        return None;
    }
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            end = frac_end;
        }
    }
    Some(&text[..end])
}

/// A decoded reply line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply<'a> {
    /// Handshake or command acknowledgement
    Ack(AckKind),
    /// Battery report
    Battery(Telemetry),
    /// Periodic liveness message
    Heartbeat { seq: u32 },
    /// Anything else, with line endings stripped
    Unrecognized(&'a str),
}

impl<'a> Reply<'a> {
    /// Decode one reply line
    ///
    /// Trailing `\r`/`\n` are stripped before matching.
    pub fn parse(line: &'a str) -> Result<Self, ReplyError> {
        let line = strip_line_ending(line);
        let reply = match line {
            ACK_NEW_CONNECTION => Self::Ack(AckKind::NewConnection),
            ACK_RECONNECTION => Self::Ack(AckKind::Reconnection),
            ACK_OK => Self::Ack(AckKind::Ok),
            _ => {
                if let Some(body) = line.strip_prefix(BATTERY_PREFIX) {
                    Self::Battery(Telemetry::parse(body)?)
                } else if let Some(seq) = heartbeat_seq(line) {
                    Self::Heartbeat { seq }
                } else {
                    Self::Unrecognized(line)
                }
            }
        };
        Ok(reply)
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }
}

/// True iff `line` is exactly one of the acknowledgement strings
pub fn is_acknowledgement(line: &str) -> bool {
    matches!(
        strip_line_ending(line),
        ACK_NEW_CONNECTION | ACK_RECONNECTION | ACK_OK
    )
}

/// Strip trailing carriage returns and line feeds
pub fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(|c: char| c == '\r' || c == '\n')
}

fn heartbeat_seq(line: &str) -> Option<u32> {
    let rest = line.strip_prefix('[')?;
    let (seq, rest) = rest.split_once(']')?;
    if !rest.starts_with(" tic") {
        return None;
    }
    seq.parse().ok()
}
