//! Byte transports to the gamma box
//!
//! A [`Transport`] writes CR-terminated command lines. Its read half is
//! handed to the reader thread as a [`LineSource`] that yields one reply
//! line at a time.

pub mod emulator;
pub mod serial;

use std::io::{ErrorKind, Read};

use log::warn;

use gammabox_protocol::{strip_line_ending, LINE_TERMINATOR};

use crate::channels::MAX_REPLY_LEN;
use crate::error::HostError;

pub use emulator::{EmulatedBox, EmulatorHandle, EmulatorOptions};
pub use serial::{SerialSettings, SerialTransport};

/// Write half of a link
pub trait Transport {
    /// Port the transport is attached to
    fn port_name(&self) -> &str;

    /// Write one command, appending the line terminator
    fn write_line(&mut self, line: &str) -> Result<(), HostError>;

    /// Independent read half for the reader thread
    fn take_reader(&mut self) -> Result<Box<dyn LineSource>, HostError>;
}

/// Read half of a link
pub trait LineSource: Send {
    /// Next complete reply line
    ///
    /// `Ok(None)` means nothing arrived before the read timeout. An error
    /// means the link is gone.
    fn next_line(&mut self) -> Result<Option<String>, HostError>;
}

/// Command text followed by the line terminator
pub(crate) fn terminated(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 1);
    out.push_str(line);
    out.push(LINE_TERMINATOR);
    out
}

/// Splits a byte stream with read timeouts into LF-terminated lines
///
/// More than [`MAX_REPLY_LEN`] bytes without a line feed are discarded, so
/// a port speaking something else cannot grow the buffer.
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
    /// Bytes of `pending` already known to hold no line feed
    scanned: usize,
    buf: [u8; 256],
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            scanned: 0,
            buf: [0; 256],
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let Some(offset) = self.pending[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.pending.len();
            return None;
        };
        let end = self.scanned + offset;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        self.scanned = 0;
        let text = String::from_utf8_lossy(&raw);
        Some(strip_line_ending(&text).to_string())
    }
}

impl<R: Read + Send> LineSource for LineReader<R> {
    fn next_line(&mut self) -> Result<Option<String>, HostError> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.pending.len() > MAX_REPLY_LEN {
                warn!(
                    "Discarding {} bytes with no line ending, wrong device or baud rate?",
                    self.pending.len()
                );
                self.pending.clear();
                self.scanned = 0;
                // Hand control back so the reader can check for shutdown
                return Ok(None);
            }
            match self.inner.read(&mut self.buf) {
                Ok(0) => return Err(HostError::closed("port")),
                Ok(n) => self.pending.extend_from_slice(&self.buf[..n]),
                // Partial lines stay in `pending` until the rest arrives
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    return Ok(None)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Serves chunks, timing out between them
    struct Chunked {
        chunks: Vec<Option<&'static [u8]>>,
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => Err(io::Error::new(ErrorKind::TimedOut, "timeout")),
            }
        }
    }

    /// Endless bytes with no line feed, then one real reply
    struct Noise {
        chunks_left: usize,
        reply_sent: bool,
    }

    impl Read for Noise {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks_left > 0 {
                self.chunks_left -= 1;
                buf.fill(b'x');
                return Ok(buf.len());
            }
            if self.reply_sent {
                return Ok(0);
            }
            self.reply_sent = true;
            let reply = b"Re:[] ok\n";
            buf[..reply.len()].copy_from_slice(reply);
            Ok(reply.len())
        }
    }

    #[test]
    fn test_terminated() {
        assert_eq!(terminated("stim on"), "stim on\r");
    }

    #[test]
    fn test_splits_lines_and_strips_cr() {
        let mut reader = LineReader::new(Cursor::new(b"Re:[] ok\r\n[3] tic\nfoo".to_vec()));
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("Re:[] ok"));
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("[3] tic"));
        // Unterminated tail then end of stream
        assert!(reader.next_line().is_err());
    }

    #[test]
    fn test_partial_line_survives_timeout() {
        let mut reader = LineReader::new(Chunked {
            chunks: vec![
                Some(&b"Re:[] bat"[..]),
                None,
                Some(&b"tery *capacity=21\r\n"[..]),
            ],
        });
        assert_eq!(reader.next_line().unwrap(), None);
        assert_eq!(
            reader.next_line().unwrap().as_deref(),
            Some("Re:[] battery *capacity=21")
        );
    }

    #[test]
    fn test_noise_without_line_feed_is_bounded() {
        let mut reader = LineReader::new(Noise {
            chunks_left: 10_000,
            reply_sent: false,
        });
        let mut discarded = 0;
        let line = loop {
            match reader.next_line().unwrap() {
                Some(line) => break line,
                None => {
                    discarded += 1;
                    assert!(reader.pending.len() <= MAX_REPLY_LEN + reader.buf.len());
                }
            }
        };
        assert!(discarded >= 10_000 / 2);
        assert!(line.ends_with("Re:[] ok"));
        assert!(line.len() <= MAX_REPLY_LEN + reader.buf.len());
    }
}
