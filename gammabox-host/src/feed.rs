//! Demo pressure feed
//!
//! Stands in for hand tracking: every finger presses and releases on a
//! sine wave.

use std::f64::consts::TAU;

use gammabox_core::input::{Finger, HandPressure, PressureFeed};

/// Default oscillation period
pub const DEFAULT_PERIOD_MS: u64 = 3000;

/// Sine-wave pressure on every finger
#[derive(Debug, Clone)]
pub struct OscillatingFeed {
    period_ms: u64,
    /// Phase offset between neighbouring fingers, as a fraction of the period
    stagger: f64,
    started_ms: Option<u64>,
}

impl OscillatingFeed {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            stagger: 0.0,
            started_ms: None,
        }
    }

    /// Offset each finger's wave from the previous one
    pub fn staggered(mut self, fraction: f64) -> Self {
        self.stagger = fraction;
        self
    }

    fn level(&self, elapsed_ms: u64, phase: f64) -> f32 {
        let t = elapsed_ms as f64 / self.period_ms as f64 + phase;
        (((TAU * t).sin() + 1.0) / 2.0) as f32
    }
}

impl Default for OscillatingFeed {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_MS)
    }
}

impl PressureFeed for OscillatingFeed {
    fn sample(&mut self, now_ms: u64) -> HandPressure {
        let start = *self.started_ms.get_or_insert(now_ms);
        let elapsed = now_ms.saturating_sub(start);
        let mut hand = HandPressure::released();
        for (i, finger) in Finger::ALL.into_iter().enumerate() {
            hand.set(finger, self.level(elapsed, self.stagger * i as f64));
        }
        hand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_follows_sine() {
        let mut feed = OscillatingFeed::new(4000);
        let start = feed.sample(1000);
        assert!(start.is_active());
        assert!(close(start.get(Finger::Thumb), 0.5));
        assert!(close(feed.sample(2000).max(), 1.0));
        assert!(close(feed.sample(4000).get(Finger::Pinky), 0.0));
        assert!(close(feed.sample(5000).get(Finger::Index), 0.5));
    }

    #[test]
    fn test_stagger() {
        let mut feed = OscillatingFeed::new(4000).staggered(0.25);
        let hand = feed.sample(0);
        assert!(close(hand.get(Finger::Thumb), 0.5));
        assert!(close(hand.get(Finger::Index), 1.0));
        assert!(close(hand.get(Finger::Middle), 0.5));
        assert!(close(hand.get(Finger::Ring), 0.0));
    }
}
