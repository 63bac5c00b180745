//! Bounded outbound FIFO

use alloc::collections::VecDeque;

use gammabox_protocol::CommandString;

/// How a message treats the queue limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// Dropped when the queue is full
    #[default]
    Normal,
    /// Always enqueued, ignoring the limit
    Bypass,
}

/// Result of enqueueing a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendOutcome {
    Queued,
    /// Queue was full; the message was discarded
    Dropped,
}

/// FIFO of pending command lines
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    messages: VecDeque<CommandString>,
    capacity: usize,
    dropped: u32,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Enqueue a message
    ///
    /// Normal messages are dropped once `capacity` messages are waiting;
    /// bypass messages are always accepted.
    pub fn send(&mut self, message: CommandString, priority: Priority) -> SendOutcome {
        if priority == Priority::Normal && self.messages.len() >= self.capacity {
            self.dropped = self.dropped.saturating_add(1);
            return SendOutcome::Dropped;
        }
        self.messages.push_back(message);
        SendOutcome::Queued
    }

    pub fn pop(&mut self) -> Option<CommandString> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages dropped since creation
    pub fn dropped_count(&self) -> u32 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.as_str())
    }
}
