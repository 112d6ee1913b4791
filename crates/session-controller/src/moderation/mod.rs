//! Warn, coach, or evict participants from their metric streams and the
//! simulated posture/toxicity signals.

pub mod engine;
pub mod simulator;

pub use engine::{
    InterventionKind, ModerationDecision, ModerationEngine, ModerationInput, ModerationTracking,
    ModerationWarning,
};
pub use simulator::{PostureFlavor, SignalSimulator, SimulatedSignals};
