//! Stimulation modulation
//!
//! Independent sources each describe how they want the output shaped this
//! tick; the [`Combiner`] reduces their requests into one command.

pub mod combiner;
pub mod contribution;
pub mod source;
pub mod sources;

pub use combiner::{
    merge, CombineError, CombinedState, Combiner, SubscribeError, Subscription, TickOutput,
    Unsubscription,
};
pub use contribution::{ChannelKind, Contribution, Fault, ValidationError};
pub use source::{ModulationSource, TickContext};
pub use sources::{ConstantAmplitude, StepwiseFrequency, StepwisePads, StepwiseWidth};
