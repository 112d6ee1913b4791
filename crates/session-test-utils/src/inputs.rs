//! Deterministic cognitive inputs.

use common::types::ParticipantId;
use session_controller::cognitive::{
    CognitiveInput, CognitiveInputSource, InputSourceFactory, Valence,
};
use std::collections::HashMap;

/// Feeds every participant a fixed input, with optional per-id overrides.
#[derive(Debug, Clone)]
pub struct ConstantInputs {
    default: CognitiveInput,
    overrides: HashMap<ParticipantId, CognitiveInput>,
}

impl ConstantInputs {
    pub fn new(default: CognitiveInput) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Moderate, steady input that keeps every metric inside its normal band.
    pub fn calm() -> Self {
        Self::new(calm_input())
    }

    /// Calm input with negative valence on every tick, which drives stress up.
    pub fn negative() -> Self {
        Self::new(CognitiveInput {
            valence: Valence::Negative,
            ..calm_input()
        })
    }

    /// Use `input` for `participant` instead of the default.
    pub fn with(mut self, participant: ParticipantId, input: CognitiveInput) -> Self {
        self.overrides.insert(participant, input);
        self
    }
}

impl Default for ConstantInputs {
    fn default() -> Self {
        Self::calm()
    }
}

fn calm_input() -> CognitiveInput {
    CognitiveInput {
        interaction_level: 0.4,
        gaze_focus: 0.7,
        valence: Valence::Neutral,
        visual_scanning: 0.4,
    }
}

impl InputSourceFactory for ConstantInputs {
    fn create(&self, participant: &ParticipantId) -> Box<dyn CognitiveInputSource> {
        let input = self
            .overrides
            .get(participant)
            .copied()
            .unwrap_or(self.default);
        Box::new(ConstantSource(input))
    }
}

struct ConstantSource(CognitiveInput);

impl CognitiveInputSource for ConstantSource {
    fn next_input(&mut self) -> CognitiveInput {
        self.0
    }
}
