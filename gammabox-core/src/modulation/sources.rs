//! Built-in modulation sources
//!
//! The stepwise sources quantize finger pressure into four levels and map
//! them onto the 32-pad glove. Pad indices below are "logical" glove pads
//! (grouped by finger); [`GLOVE_PAD_ORDER`] maps each one to the physical
//! pad number the box expects.

use alloc::vec;
use alloc::vec::Vec;

use super::contribution::{ChannelKind, Contribution};
use super::source::{ModulationSource, TickContext};
use crate::config::DeviceConfig;
use crate::input::{pressure_bucket, Finger, HandPressure};

/// Name of the glove device in the device registry
pub const GLOVE_DEVICE: &str = "glove";

/// Pads on the glove
pub const GLOVE_PADS: usize = 32;

/// Physical pad number (1-based) for each logical glove pad
pub const GLOVE_PAD_ORDER: [u8; GLOVE_PADS] = [
    30, 27, 29, 28, 25, 31, 32, 26, 17, 18, 20, 1, 2, 22, 19, 3, 23, 21, 24, 4, 5, 8, 9, 6, 7, 10,
    13, 14, 11, 12, 15, 16,
];

/// Logical pads (1-based) lit at each pressure level, lowest level first
const GLOVE_LEVELS: [&[u8]; 4] = [
    &[1, 9, 22, 27, 32],
    &[1, 2, 9, 10, 22, 23, 27, 28, 32],
    &[1, 2, 3, 5, 9, 10, 11, 13, 22, 23, 24, 27, 28, 29, 32],
    &[
        1, 2, 3, 5, 7, 9, 10, 11, 13, 15, 22, 23, 24, 26, 27, 28, 29, 31, 32,
    ],
];

/// Extra pulse width per pressure bucket step
const WIDTH_PER_BUCKET: f32 = 200.0;

/// Finger that owns a logical glove pad (zero-based)
pub fn glove_finger(pad: usize) -> Finger {
    match pad {
        0..=7 => Finger::Thumb,
        8..=20 => Finger::Index,
        21..=25 => Finger::Middle,
        26..=30 => Finger::Ring,
        _ => Finger::Pinky,
    }
}

fn is_glove(config: &DeviceConfig) -> bool {
    config.device_name() == GLOVE_DEVICE && config.num_pads() == GLOVE_PADS
}

/// Physical (zero-based) index of a logical glove pad
fn physical(pad: usize) -> usize {
    GLOVE_PAD_ORDER[pad] as usize - 1
}

/// Level table for the strongest pressure on the hand
fn glove_level(pressure: &HandPressure) -> &'static [u8] {
    let bucket = pressure_bucket(pressure.max());
    if bucket >= 1.0 {
        GLOVE_LEVELS[3]
    } else if bucket >= 0.75 {
        GLOVE_LEVELS[2]
    } else if bucket >= 0.5 {
        GLOVE_LEVELS[1]
    } else {
        GLOVE_LEVELS[0]
    }
}

/// Holds every pad at its calibrated amplitude
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantAmplitude;

impl ConstantAmplitude {
    pub const NAME: &'static str = "constant-amplitude";
}

impl ModulationSource for ConstantAmplitude {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn contribution(&mut self, ctx: &TickContext<'_>) -> Option<Contribution> {
        Some(Contribution::new(
            ChannelKind::Amplitude,
            ctx.baseline.amps().to_vec(),
        ))
    }
}

/// Lights more glove pads as grip pressure rises
#[derive(Debug, Clone, Copy, Default)]
pub struct StepwisePads;

impl StepwisePads {
    pub const NAME: &'static str = "stepwise-pads";
}

impl ModulationSource for StepwisePads {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn contribution(&mut self, ctx: &TickContext<'_>) -> Option<Contribution> {
        if !ctx.pressure.is_active() {
            return None;
        }
        let level = glove_level(ctx.pressure);
        let mut values = vec![0.0; GLOVE_PADS];
        for pad in 0..GLOVE_PADS {
            if level.contains(&(pad as u8 + 1)) {
                values[physical(pad)] = 1.0;
            }
        }
        Some(Contribution::new(ChannelKind::PadMask, values))
    }

    fn is_compatible_with(&self, config: &DeviceConfig) -> bool {
        is_glove(config)
    }

    fn needs_hand_tracking(&self) -> bool {
        true
    }
}

/// Widens each glove pad's pulse with its finger's pressure
#[derive(Debug, Clone, Copy, Default)]
pub struct StepwiseWidth;

impl StepwiseWidth {
    pub const NAME: &'static str = "stepwise-width";
}

impl ModulationSource for StepwiseWidth {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn contribution(&mut self, ctx: &TickContext<'_>) -> Option<Contribution> {
        if !ctx.pressure.is_active() {
            return None;
        }
        let mut values: Vec<f32> = vec![0.0; GLOVE_PADS];
        if ctx.pressure.any_contact() {
            let base = ctx.baseline.widths();
            for pad in 0..GLOVE_PADS {
                let bucket = pressure_bucket(ctx.pressure.get(glove_finger(pad)));
                values[physical(pad)] = base[pad] as f32 + WIDTH_PER_BUCKET * bucket;
            }
        }
        Some(Contribution::new(ChannelKind::Width, values))
    }

    fn is_compatible_with(&self, config: &DeviceConfig) -> bool {
        is_glove(config)
    }

    fn needs_hand_tracking(&self) -> bool {
        true
    }
}

/// Raises the stimulation frequency with grip pressure
#[derive(Debug, Clone, Copy, Default)]
pub struct StepwiseFrequency;

impl StepwiseFrequency {
    pub const NAME: &'static str = "stepwise-frequency";
}

impl ModulationSource for StepwiseFrequency {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn contribution(&mut self, ctx: &TickContext<'_>) -> Option<Contribution> {
        if !ctx.pressure.is_active() {
            return None;
        }
        let base = ctx.config.base_freq() as f32;
        let max = ctx.config.max_freq() as f32;
        let bucket = pressure_bucket(ctx.pressure.max());
        Some(Contribution::frequency(base + (max - base) * bucket))
    }

    fn needs_hand_tracking(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::device::tests::{glove, strip};
    use crate::config::CalibrationBaseline;

    fn ask(source: &mut dyn ModulationSource, config: &DeviceConfig, pressure: HandPressure) -> Option<Contribution> {
        let baseline = CalibrationBaseline::for_device(config);
        let ctx = TickContext {
            config,
            baseline: &baseline,
            pressure: &pressure,
            now_ms: 0,
        };
        source.contribution(&ctx)
    }

    fn lit(contribution: &Contribution) -> std::vec::Vec<usize> {
        contribution
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(|(i, _)| i + 1)
            .collect()
    }

    #[test]
    fn test_pad_order_is_a_permutation() {
        let mut seen = [false; GLOVE_PADS];
        for &pad in GLOVE_PAD_ORDER.iter() {
            assert!(!seen[pad as usize - 1]);
            seen[pad as usize - 1] = true;
        }
    }

    #[test]
    fn test_glove_fingers() {
        assert_eq!(glove_finger(0), Finger::Thumb);
        assert_eq!(glove_finger(7), Finger::Thumb);
        assert_eq!(glove_finger(8), Finger::Index);
        assert_eq!(glove_finger(20), Finger::Index);
        assert_eq!(glove_finger(21), Finger::Middle);
        assert_eq!(glove_finger(26), Finger::Ring);
        assert_eq!(glove_finger(31), Finger::Pinky);
    }

    #[test]
    fn test_constant_amplitude_uses_baseline() {
        let device = strip(3, &[]);
        let c = ask(&mut ConstantAmplitude, &device, HandPressure::idle()).unwrap();
        assert_eq!(c.kind, ChannelKind::Amplitude);
        assert_eq!(c.values, [0.0; 3]);
        assert!(ConstantAmplitude.is_compatible_with(&device));
        assert!(!ConstantAmplitude.needs_hand_tracking());
    }

    #[test]
    fn test_stepwise_pads_levels() {
        let device = glove();
        let light = ask(&mut StepwisePads, &device, HandPressure::uniform(0.1)).unwrap();
        // Level 1 logical pads 1, 9, 22, 27, 32 map to physical 30, 17, 8, 13, 16
        assert_eq!(lit(&light), [8, 13, 16, 17, 30]);

        let firm = ask(&mut StepwisePads, &device, HandPressure::uniform(0.9)).unwrap();
        assert_eq!(lit(&firm).len(), 19);

        let medium = ask(
            &mut StepwisePads,
            &device,
            HandPressure::released().with(Finger::Index, 0.6),
        )
        .unwrap();
        assert_eq!(lit(&medium).len(), 15);
    }

    #[test]
    fn test_stepwise_width() {
        let device = glove();
        let idle_hand = ask(&mut StepwiseWidth, &device, HandPressure::released()).unwrap();
        assert!(idle_hand.values.iter().all(|&v| v == 0.0));

        let hand = HandPressure::released().with(Finger::Thumb, 1.0);
        let c = ask(&mut StepwiseWidth, &device, hand).unwrap();
        // Logical pad 0 (thumb) sits on physical pad 30; base width 50
        assert_eq!(c.values[29], 50.0 + 200.0);
        // Logical pad 8 (index, no pressure) sits on physical pad 17
        assert_eq!(c.values[16], 50.0 + 200.0 * 0.25);
    }

    #[test]
    fn test_stepwise_frequency() {
        let device = glove();
        let c = ask(&mut StepwiseFrequency, &device, HandPressure::uniform(0.6)).unwrap();
        assert_eq!(c.values, [50.0 + 150.0 * 0.75]);
        assert!(StepwiseFrequency.is_compatible_with(&strip(4, &[])));
    }

    #[test]
    fn test_inactive_feed_contributes_nothing() {
        let device = glove();
        assert!(ask(&mut StepwisePads, &device, HandPressure::idle()).is_none());
        assert!(ask(&mut StepwiseWidth, &device, HandPressure::idle()).is_none());
        assert!(ask(&mut StepwiseFrequency, &device, HandPressure::idle()).is_none());
    }

    #[test]
    fn test_glove_sources_reject_other_devices() {
        let device = strip(32, &[]);
        assert!(!StepwisePads.is_compatible_with(&device));
        assert!(!StepwiseWidth.is_compatible_with(&device));
        assert!(StepwisePads.is_compatible_with(&glove()));
    }
}
