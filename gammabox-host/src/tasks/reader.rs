//! Reply reader thread
//!
//! Pulls lines off the transport's read half and hands them to the
//! controller through [`LinkChannels`]. A read failure raises `link_lost`
//! and ends the thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::channels::{LinkChannels, ReplyLine, MAX_REPLY_LEN};
use crate::error::HostError;
use crate::transport::LineSource;

/// Running reader thread; stopped and joined on drop
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Ask the thread to stop and wait for it
    ///
    /// Returns after the current read times out.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Reply reader panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start reading replies from `source` on a background thread
pub fn spawn_reader(
    source: Box<dyn LineSource>,
    channels: Arc<LinkChannels>,
) -> Result<ReaderHandle, HostError> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let thread = thread::Builder::new()
        .name("gammabox-rx".into())
        .spawn(move || reader_loop(source, &channels, &flag))?;
    Ok(ReaderHandle {
        stop,
        thread: Some(thread),
    })
}

fn reader_loop(mut source: Box<dyn LineSource>, channels: &LinkChannels, stop: &AtomicBool) {
    info!("Reply reader started");

    while !stop.load(Ordering::Relaxed) {
        match source.next_line() {
            Ok(Some(line)) => forward(channels, &line),
            Ok(None) => {}
            Err(e) => {
                if !stop.load(Ordering::Relaxed) {
                    error!("Read from gamma box failed: {}", e);
                    channels.link_lost.signal(());
                }
                break;
            }
        }
    }

    debug!("Reply reader stopped");
}

/// Queue one line for the controller
fn forward(channels: &LinkChannels, line: &str) {
    if line.is_empty() {
        return;
    }
    let mut reply = ReplyLine::new();
    for c in line.chars() {
        if reply.push(c).is_err() {
            warn!("Reply longer than {} bytes, truncated", MAX_REPLY_LEN);
            break;
        }
    }
    if channels.replies.try_send(reply).is_err() {
        warn!("Reply channel full, dropping line");
    }
}
