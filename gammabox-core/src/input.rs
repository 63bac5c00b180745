//! Hand pressure input
//!
//! Hand tracking and grab detection live outside this crate. They hand over
//! one [`HandPressure`] per frame through a [`PressureFeed`].

/// Fingers of one hand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    /// All fingers, thumb first
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Per-finger contact pressure for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandPressure {
    pressures: [f32; 5],
    active: bool,
}

impl HandPressure {
    /// No tracking data this frame
    pub const fn idle() -> Self {
        Self {
            pressures: [0.0; 5],
            active: false,
        }
    }

    /// Tracked hand with no contact
    pub const fn released() -> Self {
        Self {
            pressures: [0.0; 5],
            active: true,
        }
    }

    /// Tracked hand with every finger at `pressure`
    pub fn uniform(pressure: f32) -> Self {
        let mut hand = Self::released();
        for finger in Finger::ALL {
            hand.set(finger, pressure);
        }
        hand
    }

    /// Set one finger's pressure, clamped to `[0, 1]`
    pub fn set(&mut self, finger: Finger, pressure: f32) {
        let pressure = if pressure.is_nan() {
            0.0
        } else {
            pressure.clamp(0.0, 1.0)
        };
        self.pressures[finger.slot()] = pressure;
    }

    pub fn with(mut self, finger: Finger, pressure: f32) -> Self {
        self.set(finger, pressure);
        self
    }

    pub fn get(&self, finger: Finger) -> f32 {
        self.pressures[finger.slot()]
    }

    /// Highest pressure across all fingers
    pub fn max(&self) -> f32 {
        self.pressures.iter().copied().fold(0.0, f32::max)
    }

    /// Whether the tracking source produced data this frame
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether any finger touches something
    pub fn any_contact(&self) -> bool {
        self.pressures.iter().any(|&p| p > 0.0)
    }
}

/// Source of per-frame hand pressure
pub trait PressureFeed {
    /// Sample the feed at `now_ms`
    fn sample(&mut self, now_ms: u64) -> HandPressure;
}

/// Quantize a pressure into the four stimulation levels
///
/// Returns 0.25, 0.5, 0.75 or 1.0.
pub fn pressure_bucket(pressure: f32) -> f32 {
    if pressure > 0.75 {
        1.0
    } else if pressure > 0.5 {
        0.75
    } else if pressure > 0.25 {
        0.5
    } else {
        0.25
    }
}
