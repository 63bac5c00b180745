//! Per-tick reduction of modulation contributions
//!
//! Every tick the combiner asks each subscribed source for a contribution,
//! validates all of them, and only then merges:
//!
//! - amplitude and width: per-pad maximum
//! - pad mask: a pad is enabled if any contributor enables it
//! - frequency: maximum
//!
//! A channel nobody contributed to falls back to its default: all pads on,
//! the calibration baseline, or the device base frequency.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use heapless::Vec as PadVec;

use gammabox_protocol::{Command, CommandString, EncodeError, StimFrame, MAX_PADS};

use super::contribution::{ChannelKind, Contribution, ValidationError};
use super::source::{ModulationSource, TickContext};
use crate::config::{CalibrationBaseline, CalibrationError, DeviceConfig, DeviceName};
use crate::input::HandPressure;

/// Errors that abort a tick
#[derive(Debug, Clone, PartialEq)]
pub enum CombineError {
    /// A source produced an invalid contribution
    Invalid {
        source: String,
        error: ValidationError,
    },
    /// The combined state could not be rendered
    Encode(EncodeError),
}

impl fmt::Display for CombineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { source, error } => write!(f, "source '{}': {}", source, error),
            Self::Encode(e) => write!(f, "cannot render stimulation command: {}", e),
        }
    }
}

impl From<EncodeError> for CombineError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

/// Subscription rejected
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeError {
    /// Source cannot drive the active device
    Incompatible { source: String, device: DeviceName },
}

impl fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incompatible { source, device } => {
                write!(f, "source '{}' is not compatible with device '{}'", source, device)
            }
        }
    }
}

/// Result of a successful subscribe call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Subscription {
    /// First subscriber; stimulation should be switched on
    EnableStimulation,
    Added,
    /// A source with the same name is already subscribed
    AlreadySubscribed,
}

/// Result of an unsubscribe call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unsubscription {
    /// Last subscriber left; stimulation should be switched off
    DisableStimulation,
    Removed,
    NotSubscribed,
}

/// Merged output for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedState {
    pub pad_mask: PadVec<bool, MAX_PADS>,
    pub amplitudes: PadVec<f32, MAX_PADS>,
    pub widths: PadVec<u32, MAX_PADS>,
    pub frequency: u32,
}

impl CombinedState {
    /// Command frame for `config`
    pub fn frame<'a>(&'a self, config: &'a DeviceConfig) -> StimFrame<'a> {
        StimFrame::new(
            &self.pad_mask,
            &self.amplitudes,
            &self.widths,
            config.anode_layout(),
        )
    }
}

/// Rendered commands for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub state: CombinedState,
    /// `velec` command
    pub stimulation: CommandString,
    /// `freq` command, only when the frequency changed
    pub frequency: Option<CommandString>,
}

/// Merges subscribed sources into one command per tick
pub struct Combiner {
    config: DeviceConfig,
    baseline: CalibrationBaseline,
    sources: Vec<Box<dyn ModulationSource>>,
    last_frequency: Option<u32>,
}

impl fmt::Debug for Combiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combiner")
            .field("device", &self.config.device_name())
            .field("sources", &self.names().collect::<Vec<_>>())
            .field("last_frequency", &self.last_frequency)
            .finish()
    }
}

impl Combiner {
    /// Create a combiner for `config`
    ///
    /// The baseline must hold one entry per device pad.
    pub fn new(config: DeviceConfig, baseline: CalibrationBaseline) -> Result<Self, CalibrationError> {
        check_baseline(&config, &baseline)?;
        Ok(Self {
            config,
            baseline,
            sources: Vec::new(),
            last_frequency: None,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn baseline(&self) -> &CalibrationBaseline {
        &self.baseline
    }

    /// Replace the calibration baseline
    pub fn set_baseline(&mut self, baseline: CalibrationBaseline) -> Result<(), CalibrationError> {
        check_baseline(&self.config, &baseline)?;
        self.baseline = baseline;
        Ok(())
    }

    /// Add a source
    pub fn subscribe(
        &mut self,
        source: Box<dyn ModulationSource>,
    ) -> Result<Subscription, SubscribeError> {
        if !source.is_compatible_with(&self.config) {
            return Err(SubscribeError::Incompatible {
                source: source.name().to_string(),
                device: self.config.spec().device_name.clone(),
            });
        }
        if self.is_subscribed(source.name()) {
            return Ok(Subscription::AlreadySubscribed);
        }
        self.sources.push(source);
        if self.sources.len() == 1 {
            Ok(Subscription::EnableStimulation)
        } else {
            Ok(Subscription::Added)
        }
    }

    /// Remove a source by name
    pub fn unsubscribe(&mut self, name: &str) -> Unsubscription {
        let Some(position) = self.sources.iter().position(|s| s.name() == name) else {
            return Unsubscription::NotSubscribed;
        };
        self.sources.remove(position);
        if self.sources.is_empty() {
            Unsubscription::DisableStimulation
        } else {
            Unsubscription::Removed
        }
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name() == name)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sources.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name())
    }

    /// Record a frequency sent outside the combiner, e.g. by the handshake
    pub fn note_frequency_sent(&mut self, hz: u32) {
        self.last_frequency = Some(hz);
    }

    /// Merge this tick's contributions
    ///
    /// Returns `Ok(None)` when nothing is subscribed.
    pub fn combine(
        &mut self,
        pressure: &HandPressure,
        now_ms: u64,
    ) -> Result<Option<CombinedState>, CombineError> {
        if self.sources.is_empty() {
            return Ok(None);
        }

        let ctx = TickContext {
            config: &self.config,
            baseline: &self.baseline,
            pressure,
            now_ms,
        };
        let mut gathered: Vec<(usize, Contribution)> = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter_mut().enumerate() {
            if let Some(contribution) = source.contribution(&ctx) {
                gathered.push((index, contribution));
            }
        }

        for (index, contribution) in &gathered {
            contribution
                .validate(&self.config)
                .map_err(|error| CombineError::Invalid {
                    source: self.sources[*index].name().to_string(),
                    error,
                })?;
        }

        let contributions = gathered.iter().map(|(_, c)| c);
        Ok(Some(merge(&self.config, &self.baseline, contributions)))
    }

    /// Merge and render this tick's commands
    pub fn tick(
        &mut self,
        pressure: &HandPressure,
        now_ms: u64,
    ) -> Result<Option<TickOutput>, CombineError> {
        let Some(state) = self.combine(pressure, now_ms)? else {
            return Ok(None);
        };

        let mut stimulation = CommandString::new();
        state.frame(&self.config).write_to(&mut stimulation)?;

        let frequency = if self.last_frequency == Some(state.frequency) {
            None
        } else {
            Some(Command::Frequency(state.frequency).encode()?)
        };
        self.last_frequency = Some(state.frequency);

        Ok(Some(TickOutput {
            state,
            stimulation,
            frequency,
        }))
    }
}

/// Reduce validated contributions into one state
pub fn merge<'c>(
    config: &DeviceConfig,
    baseline: &CalibrationBaseline,
    contributions: impl IntoIterator<Item = &'c Contribution>,
) -> CombinedState {
    let n = config.num_pads();
    let mut mask = [false; MAX_PADS];
    let mut amps = [0.0f32; MAX_PADS];
    let mut widths = [0.0f32; MAX_PADS];
    let mut frequency: Option<f32> = None;
    let (mut has_mask, mut has_amps, mut has_widths) = (false, false, false);

    for contribution in contributions {
        let values = &contribution.values;
        match contribution.kind {
            ChannelKind::PadMask => {
                has_mask = true;
                for (slot, &v) in mask.iter_mut().zip(values) {
                    *slot |= v > 0.0;
                }
            }
            ChannelKind::Amplitude => {
                has_amps = true;
                for (slot, &v) in amps.iter_mut().zip(values) {
                    *slot = slot.max(v);
                }
            }
            ChannelKind::Width => {
                has_widths = true;
                for (slot, &v) in widths.iter_mut().zip(values) {
                    *slot = slot.max(v);
                }
            }
            ChannelKind::Frequency => {
                if let Some(&v) = values.first() {
                    frequency = Some(frequency.map_or(v, |f| f.max(v)));
                }
            }
        }
    }

    let mut state = CombinedState {
        pad_mask: PadVec::new(),
        amplitudes: PadVec::new(),
        widths: PadVec::new(),
        frequency: frequency.map_or(config.base_freq(), |hz| hz as u32),
    };
    // n <= MAX_PADS is checked when the config is built
    for pad in 0..n {
        let _ = state.pad_mask.push(if has_mask { mask[pad] } else { true });
        let _ = state
            .amplitudes
            .push(if has_amps { amps[pad] } else { baseline.amps()[pad] });
        let _ = state.widths.push(if has_widths {
            widths[pad] as u32
        } else {
            baseline.widths()[pad]
        });
    }
    state
}

fn check_baseline(config: &DeviceConfig, baseline: &CalibrationBaseline) -> Result<(), CalibrationError> {
    if baseline.len() != config.num_pads() {
        return Err(CalibrationError::PadCountMismatch {
            expected: config.num_pads(),
            found: baseline.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::device::tests::strip;
    use crate::modulation::contribution::Fault;
    use alloc::vec;
    use proptest::prelude::*;

    /// Source that returns a fixed contribution every tick
    struct Fixed {
        name: &'static str,
        contribution: Option<Contribution>,
        compatible: bool,
    }

    impl Fixed {
        fn boxed(name: &'static str, kind: ChannelKind, values: Vec<f32>) -> Box<Self> {
            Box::new(Self {
                name,
                contribution: Some(Contribution::new(kind, values)),
                compatible: true,
            })
        }
    }

    impl ModulationSource for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn contribution(&mut self, _ctx: &TickContext<'_>) -> Option<Contribution> {
            self.contribution.clone()
        }

        fn is_compatible_with(&self, _config: &DeviceConfig) -> bool {
            self.compatible
        }
    }

    fn combiner(n: u16) -> Combiner {
        let device = strip(n, &[]);
        let baseline = CalibrationBaseline::new(
            &vec![1.5; n as usize],
            &vec![150; n as usize],
        )
        .unwrap();
        Combiner::new(device, baseline).unwrap()
    }

    #[test]
    fn test_subscription_lifecycle() {
        let mut c = combiner(4);
        let amp = || Fixed::boxed("amp", ChannelKind::Amplitude, vec![1.0; 4]);
        assert_eq!(c.subscribe(amp()), Ok(Subscription::EnableStimulation));
        assert_eq!(c.subscribe(amp()), Ok(Subscription::AlreadySubscribed));
        assert_eq!(
            c.subscribe(Fixed::boxed("freq", ChannelKind::Frequency, vec![20.0])),
            Ok(Subscription::Added)
        );
        assert_eq!(c.subscriber_count(), 2);

        assert_eq!(c.unsubscribe("amp"), Unsubscription::Removed);
        assert_eq!(c.unsubscribe("amp"), Unsubscription::NotSubscribed);
        assert_eq!(c.unsubscribe("freq"), Unsubscription::DisableStimulation);
    }

    #[test]
    fn test_incompatible_source_rejected() {
        let mut c = combiner(4);
        let mut source = Fixed::boxed("glove-only", ChannelKind::PadMask, vec![1.0; 4]);
        source.compatible = false;
        assert!(matches!(
            c.subscribe(source),
            Err(SubscribeError::Incompatible { .. })
        ));
        assert_eq!(c.subscriber_count(), 0);
    }

    #[test]
    fn test_no_subscribers_sends_nothing() {
        let mut c = combiner(4);
        assert_eq!(c.tick(&HandPressure::idle(), 0), Ok(None));
    }

    #[test]
    fn test_defaults_for_missing_channels() {
        let mut c = combiner(3);
        c.subscribe(Fixed::boxed("freq", ChannelKind::Frequency, vec![40.0]))
            .unwrap();
        let out = c.tick(&HandPressure::idle(), 0).unwrap().unwrap();

        assert_eq!(out.state.pad_mask.as_slice(), &[true; 3]);
        assert_eq!(out.state.amplitudes.as_slice(), &[1.5; 3]);
        assert_eq!(out.state.widths.as_slice(), &[150; 3]);
        assert_eq!(out.state.frequency, 40);
        assert_eq!(
            out.stimulation.as_str(),
            "velec 11 *name test *elec 1 *pads 1=C,2=C,3=C *amp 1=1.5,2=1.5,3=1.5 \
             *width 1=150,2=150,3=150 *selected 1 *sync 0"
        );
        assert_eq!(out.frequency.unwrap().as_str(), "freq 40");
    }

    #[test]
    fn test_max_combine() {
        let mut c = combiner(3);
        c.subscribe(Fixed::boxed("a", ChannelKind::Amplitude, vec![1.0, 4.0, 0.0]))
            .unwrap();
        c.subscribe(Fixed::boxed("b", ChannelKind::Amplitude, vec![2.0, 3.0, 0.5]))
            .unwrap();
        c.subscribe(Fixed::boxed("w", ChannelKind::Width, vec![120.9, 300.0, 0.0]))
            .unwrap();
        c.subscribe(Fixed::boxed("m1", ChannelKind::PadMask, vec![1.0, 0.0, 0.0]))
            .unwrap();
        c.subscribe(Fixed::boxed("m2", ChannelKind::PadMask, vec![0.0, 0.0, 1.0]))
            .unwrap();
        c.subscribe(Fixed::boxed("f1", ChannelKind::Frequency, vec![30.0]))
            .unwrap();
        c.subscribe(Fixed::boxed("f2", ChannelKind::Frequency, vec![60.0]))
            .unwrap();

        let state = c.combine(&HandPressure::idle(), 0).unwrap().unwrap();
        assert_eq!(state.amplitudes.as_slice(), &[2.0, 4.0, 0.5]);
        assert_eq!(state.widths.as_slice(), &[120, 300, 0]);
        assert_eq!(state.pad_mask.as_slice(), &[true, false, true]);
        assert_eq!(state.frequency, 60);
    }

    #[test]
    fn test_negative_amplitude_aborts_tick() {
        let mut c = combiner(2);
        c.subscribe(Fixed::boxed("ok", ChannelKind::Width, vec![100.0, 100.0]))
            .unwrap();
        c.subscribe(Fixed::boxed("bad", ChannelKind::Amplitude, vec![1.0, -1.0]))
            .unwrap();

        let err = c.tick(&HandPressure::idle(), 0).unwrap_err();
        assert_eq!(
            err,
            CombineError::Invalid {
                source: "bad".to_string(),
                error: ValidationError {
                    kind: ChannelKind::Amplitude,
                    fault: Fault::NegativeValue { index: 1 },
                },
            }
        );
        // Subscribers survive a failed tick
        assert_eq!(c.subscriber_count(), 2);
    }

    #[test]
    fn test_frequency_sent_only_on_change() {
        let mut c = combiner(2);
        c.subscribe(Fixed::boxed("amp", ChannelKind::Amplitude, vec![1.0, 1.0]))
            .unwrap();
        c.note_frequency_sent(30);
        let out = c.tick(&HandPressure::idle(), 0).unwrap().unwrap();
        assert_eq!(out.state.frequency, 30);
        assert!(out.frequency.is_none());

        c.subscribe(Fixed::boxed("f", ChannelKind::Frequency, vec![45.0]))
            .unwrap();
        let out = c.tick(&HandPressure::idle(), 100).unwrap().unwrap();
        assert_eq!(out.frequency.unwrap().as_str(), "freq 45");
        let out = c.tick(&HandPressure::idle(), 200).unwrap().unwrap();
        assert!(out.frequency.is_none());
    }

    #[test]
    fn test_empty_pad_mask_renders_empty_segments() {
        let mut c = combiner(4);
        c.subscribe(Fixed::boxed("off", ChannelKind::PadMask, vec![0.0; 4]))
            .unwrap();
        let out = c.tick(&HandPressure::idle(), 0).unwrap().unwrap();
        assert_eq!(
            out.stimulation.as_str(),
            "velec 11 *name test *elec 1 *pads  *amp  *width  *selected 1 *sync 0"
        );
    }

    #[test]
    fn test_baseline_must_match_device() {
        let device = strip(4, &[]);
        let short = CalibrationBaseline::new(&[1.0; 3], &[100; 3]).unwrap();
        assert!(Combiner::new(device, short).is_err());

        let mut c = combiner(2);
        let replacement = CalibrationBaseline::new(&[2.0, 3.0], &[200, 300]).unwrap();
        c.set_baseline(replacement.clone()).unwrap();
        assert_eq!(c.baseline(), &replacement);
    }

    fn amplitudes(n: usize) -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(0.0f32..5.0, n)
    }

    proptest! {
        #[test]
        fn test_merge_is_idempotent(values in amplitudes(6)) {
            let device = strip(6, &[]);
            let baseline = CalibrationBaseline::for_device(&device);
            let c = Contribution::new(ChannelKind::Amplitude, values.clone());
            let once = merge(&device, &baseline, [&c]);
            let twice = merge(&device, &baseline, [&c, &c]);
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(once.amplitudes.as_slice(), values.as_slice());
        }

        #[test]
        fn test_merge_is_order_independent(a in amplitudes(6), b in amplitudes(6)) {
            let device = strip(6, &[]);
            let baseline = CalibrationBaseline::for_device(&device);
            let ca = Contribution::new(ChannelKind::Amplitude, a);
            let cb = Contribution::new(ChannelKind::Width, b.iter().map(|v| v * 50.0).collect());
            let cc = Contribution::new(ChannelKind::Amplitude, b);
            prop_assert_eq!(
                merge(&device, &baseline, [&ca, &cb, &cc]),
                merge(&device, &baseline, [&cc, &ca, &cb])
            );
        }

        #[test]
        fn test_missing_amplitude_uses_baseline(widths in proptest::collection::vec(100.0f32..400.0, 5)) {
            let device = strip(5, &[]);
            let baseline = CalibrationBaseline::new(&[0.5, 1.0, 1.5, 2.0, 2.5], &[100; 5]).unwrap();
            let cw = Contribution::new(ChannelKind::Width, widths);
            let state = merge(&device, &baseline, [&cw]);
            prop_assert_eq!(state.amplitudes.as_slice(), baseline.amps());
        }
    }
}
