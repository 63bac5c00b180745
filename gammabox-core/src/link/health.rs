//! Link liveness supervision
//!
//! Any reply counts as a sign of life. Heartbeats are the only replies the
//! box sends unprompted, so a silent link means the box stopped talking.

/// Liveness tracker for a connected link
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    /// Silence after which the link counts as unhealthy (ms)
    timeout_ms: u64,
    /// Time since anything was heard (ms)
    silence_ms: u64,
    /// Sequence number of the last heartbeat
    last_heartbeat: Option<u32>,
}

impl LinkMonitor {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            silence_ms: 0,
            last_heartbeat: None,
        }
    }

    /// Record a heartbeat received
    pub fn heartbeat_received(&mut self, seq: u32) {
        self.last_heartbeat = Some(seq);
        self.silence_ms = 0;
    }

    /// Record any other reply
    pub fn reply_received(&mut self) {
        self.silence_ms = 0;
    }

    /// Update time tracking
    ///
    /// # Arguments
    /// - `delta_ms`: Time elapsed since last update
    pub fn update_time(&mut self, delta_ms: u64) {
        self.silence_ms = self.silence_ms.saturating_add(delta_ms);
    }

    /// Start over, e.g. after a new handshake
    pub fn reset(&mut self) {
        self.silence_ms = 0;
        self.last_heartbeat = None;
    }

    /// Check if link is healthy
    pub fn is_link_healthy(&self) -> bool {
        self.timeout_ms == 0 || self.silence_ms < self.timeout_ms
    }

    pub fn silence_ms(&self) -> u64 {
        self.silence_ms
    }

    pub fn last_heartbeat(&self) -> Option<u32> {
        self.last_heartbeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_makes_link_unhealthy() {
        let mut monitor = LinkMonitor::new(3000);
        monitor.update_time(2999);
        assert!(monitor.is_link_healthy());
        monitor.update_time(1);
        assert!(!monitor.is_link_healthy());
    }

    #[test]
    fn test_heartbeat_restores_health() {
        let mut monitor = LinkMonitor::new(1000);
        monitor.update_time(5000);
        monitor.heartbeat_received(7);
        assert!(monitor.is_link_healthy());
        assert_eq!(monitor.last_heartbeat(), Some(7));
    }

    #[test]
    fn test_zero_timeout_disables_supervision() {
        let mut monitor = LinkMonitor::new(0);
        monitor.update_time(u64::MAX);
        assert!(monitor.is_link_healthy());
    }
}
