//! Per-participant cognitive signal model.
//!
//! Heuristic inputs (interaction, gaze, valence, scanning) go in once per
//! tick; bounded attention/stress/curiosity come out.

pub mod inputs;
pub mod model;
pub mod summary;

pub use inputs::{
    CognitiveInputSource, InputSourceFactory, SimulatedInputSource, SimulatedInputs, VisionSignal,
};
pub use model::{CognitiveInput, CognitiveSample, CognitiveSignalModel, Valence};
pub use summary::{CognitiveSummary, HistoryInsights, MetricHistory};
