//! Recent traffic with the box, for display

use heapless::HistoryBuffer;

/// Entries kept
pub const HISTORY_LEN: usize = 50;

/// Longest line kept per entry
pub const MAX_HISTORY_LINE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub at_ms: u64,
    pub direction: Direction,
    /// Line text, truncated to [`MAX_HISTORY_LINE`] bytes
    pub line: heapless::String<MAX_HISTORY_LINE>,
}

/// Ring of the last [`HISTORY_LEN`] lines in either direction
pub struct MessageHistory {
    entries: HistoryBuffer<HistoryEntry, HISTORY_LEN>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self {
            entries: HistoryBuffer::new(),
        }
    }

    pub fn record(&mut self, at_ms: u64, direction: Direction, text: &str) {
        let mut line = heapless::String::new();
        for c in text.chars() {
            if line.push(c).is_err() {
                break;
            }
        }
        self.entries.write(HistoryEntry {
            at_ms,
            direction,
            line,
        });
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.recent()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent() {
        let mut history = MessageHistory::new();
        for i in 0..(HISTORY_LEN as u64 + 5) {
            history.record(i, Direction::Sent, "freq 50");
        }
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history.iter().next().unwrap().at_ms, 5);
        assert_eq!(history.latest().unwrap().at_ms, HISTORY_LEN as u64 + 4);
    }

    #[test]
    fn test_truncates_long_lines() {
        let mut history = MessageHistory::new();
        history.record(0, Direction::Received, &"y".repeat(400));
        assert_eq!(history.latest().unwrap().line.len(), MAX_HISTORY_LINE);
        assert_eq!(history.latest().unwrap().direction, Direction::Received);
    }
}
