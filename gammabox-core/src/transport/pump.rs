//! Rate-limited queue drain
//!
//! The pump is polled with the current time. Once it starts draining it
//! releases one message per `message_delay_ms` and stops after a delay in
//! which the queue stayed empty. There is only ever one drain in progress.

use gammabox_protocol::CommandString;

use super::queue::{OutboundQueue, Priority, SendOutcome};

/// Paced sender over an [`OutboundQueue`]
#[derive(Debug, Clone)]
pub struct Pump {
    queue: OutboundQueue,
    message_delay_ms: u64,
    /// Time the next message may leave, while draining
    next_release_ms: Option<u64>,
}

impl Pump {
    pub fn new(max_queue_size: usize, message_delay_ms: u64) -> Self {
        Self {
            queue: OutboundQueue::new(max_queue_size),
            message_delay_ms,
            next_release_ms: None,
        }
    }

    /// Enqueue a message
    pub fn send(&mut self, message: CommandString, priority: Priority) -> SendOutcome {
        self.queue.send(message, priority)
    }

    /// Release the next message if one is due
    pub fn poll(&mut self, now_ms: u64) -> Option<CommandString> {
        match self.next_release_ms {
            None => {
                let message = self.queue.pop()?;
                self.next_release_ms = Some(now_ms + self.message_delay_ms);
                Some(message)
            }
            Some(due) if now_ms >= due => match self.queue.pop() {
                Some(message) => {
                    self.next_release_ms = Some(now_ms + self.message_delay_ms);
                    Some(message)
                }
                None => {
                    self.next_release_ms = None;
                    None
                }
            },
            Some(_) => None,
        }
    }

    /// Whether a drain is in progress
    pub fn is_draining(&self) -> bool {
        self.next_release_ms.is_some()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Drop everything still waiting and stop draining
    pub fn clear(&mut self) {
        self.queue.clear();
        self.next_release_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> CommandString {
        CommandString::try_from(text).unwrap()
    }

    #[test]
    fn test_messages_are_paced() {
        let mut pump = Pump::new(10, 50);
        pump.send(line("a"), Priority::Normal);
        pump.send(line("b"), Priority::Normal);

        assert_eq!(pump.poll(0).unwrap().as_str(), "a");
        assert!(pump.is_draining());
        assert_eq!(pump.poll(49), None);
        assert_eq!(pump.poll(50).unwrap().as_str(), "b");
        assert_eq!(pump.poll(60), None);
        // Drain ends after a delay with nothing to send
        assert_eq!(pump.poll(100), None);
        assert!(!pump.is_draining());
    }

    #[test]
    fn test_idle_pump_sends_immediately() {
        let mut pump = Pump::new(10, 50);
        assert_eq!(pump.poll(0), None);
        assert!(!pump.is_draining());
        pump.send(line("stim on"), Priority::Bypass);
        assert_eq!(pump.poll(7).unwrap().as_str(), "stim on");
    }

    #[test]
    fn test_message_arriving_mid_delay_waits() {
        let mut pump = Pump::new(10, 50);
        pump.send(line("a"), Priority::Normal);
        pump.poll(0);
        pump.send(line("b"), Priority::Normal);
        assert_eq!(pump.poll(20), None);
        assert_eq!(pump.poll(50).unwrap().as_str(), "b");
    }

    #[test]
    fn test_clear() {
        let mut pump = Pump::new(10, 50);
        pump.send(line("a"), Priority::Normal);
        pump.send(line("b"), Priority::Normal);
        pump.poll(0);
        pump.clear();
        assert_eq!(pump.pending(), 0);
        assert!(!pump.is_draining());
        assert_eq!(pump.poll(100), None);
    }
}
