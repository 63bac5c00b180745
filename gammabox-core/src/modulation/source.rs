//! Modulation source trait

use super::contribution::Contribution;
use crate::config::{CalibrationBaseline, DeviceConfig};
use crate::input::HandPressure;

/// Everything a source may look at when asked for a contribution
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub config: &'a DeviceConfig,
    pub baseline: &'a CalibrationBaseline,
    pub pressure: &'a HandPressure,
    pub now_ms: u64,
}

/// A component that shapes the stimulation output
///
/// Sources are asked once per combiner tick. Returning `None` means the
/// source has nothing to say this tick.
pub trait ModulationSource {
    /// Unique name; subscribing two sources with the same name is a no-op
    fn name(&self) -> &str;

    /// This tick's request
    fn contribution(&mut self, ctx: &TickContext<'_>) -> Option<Contribution>;

    /// Whether this source can drive `config`
    fn is_compatible_with(&self, _config: &DeviceConfig) -> bool {
        true
    }

    /// Whether this source reads hand tracking data
    ///
    /// Such sources are only admitted once hand tracking reports ready.
    fn needs_hand_tracking(&self) -> bool {
        false
    }
}
