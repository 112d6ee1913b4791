//! Leaky-integrator model turning heuristic inputs into bounded metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const INITIAL_ATTENTION: f64 = 50.0;
const INITIAL_STRESS: f64 = 30.0;
const INITIAL_CURIOSITY: f64 = 60.0;
const INITIAL_ENGAGEMENT: f64 = 0.5;

const FATIGUE_BASE_RATE: f64 = 0.005;
const FATIGUE_STRESS_RATE: f64 = 0.005;

const ENGAGEMENT_DECAY: f64 = 0.02;
const ENGAGEMENT_BOOST: f64 = 0.1;

const ATTENTION_BASELINE: f64 = 50.0;
const ATTENTION_GAZE_WEIGHT: f64 = 50.0;
const ATTENTION_FATIGUE_WEIGHT: f64 = 30.0;
const ATTENTION_STRESS_WEIGHT: f64 = 20.0;
/// Step toward the target while the participant is interacting.
const ATTENTION_STEP_ACTIVE: f64 = 5.0;
/// Step toward the target while idle.
const ATTENTION_STEP_IDLE: f64 = 2.0;

const STRESS_DECAY: f64 = 0.5;
const FOCUS_LOAD_THRESHOLD: f64 = 80.0;
const STRESS_FOCUS_LOAD: f64 = 1.5;
const STRESS_NEGATIVE_SPIKE: f64 = 20.0;
const STRESS_POSITIVE_RELIEF: f64 = 5.0;

const CURIOSITY_DECAY: f64 = 0.8;
const CURIOSITY_BURST: f64 = 4.0;
const CURIOSITY_BURST_INTERACTION: f64 = 0.7;
const CURIOSITY_BURST_ENGAGEMENT: f64 = 0.6;
const SCANNING_FLOOR: f64 = 0.2;
const SCANNING_GAIN: f64 = 4.0;

const METRIC_MIN: f64 = 0.0;
const METRIC_MAX: f64 = 100.0;

/// Emotional tone read from the participant's expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Valence {
    Positive,
    Negative,
    #[default]
    Neutral,
}

/// One tick of heuristic input. All scalars are expected in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveInput {
    pub interaction_level: f64,
    pub gaze_focus: f64,
    pub valence: Valence,
    pub visual_scanning: f64,
}

impl CognitiveInput {
    /// Clamp every scalar into `[0, 1]`; NaN becomes 0.
    ///
    /// The model does not validate its input, callers clamp first.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            interaction_level: unit(self.interaction_level),
            gaze_focus: unit(self.gaze_focus),
            valence: self.valence,
            visual_scanning: unit(self.visual_scanning),
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Model output for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CognitiveSample {
    pub attention: f64,
    pub stress: f64,
    pub curiosity: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct CognitiveModelState {
    attention: f64,
    stress: f64,
    curiosity: f64,
    fatigue: f64,
    engagement: f64,
}

/// Per-participant integrator. Owned by exactly one tick loop.
#[derive(Debug, Clone)]
pub struct CognitiveSignalModel {
    state: CognitiveModelState,
}

impl Default for CognitiveSignalModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CognitiveSignalModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CognitiveModelState {
                attention: INITIAL_ATTENTION,
                stress: INITIAL_STRESS,
                curiosity: INITIAL_CURIOSITY,
                fatigue: 0.0,
                engagement: INITIAL_ENGAGEMENT,
            },
        }
    }

    /// Advance one tick, stamped with the current time.
    pub fn update(&mut self, input: CognitiveInput) -> CognitiveSample {
        self.update_at(input, Utc::now())
    }

    /// Advance one tick with an explicit timestamp.
    pub fn update_at(&mut self, input: CognitiveInput, timestamp: DateTime<Utc>) -> CognitiveSample {
        let s = &mut self.state;

        s.fatigue = (s.fatigue + FATIGUE_BASE_RATE + s.stress / 100.0 * FATIGUE_STRESS_RATE).min(1.0);

        s.engagement = (s.engagement * (1.0 - ENGAGEMENT_DECAY)).max(0.0);
        s.engagement = (s.engagement + input.interaction_level * ENGAGEMENT_BOOST).min(1.0);

        let attention_target = ATTENTION_BASELINE + input.gaze_focus * ATTENTION_GAZE_WEIGHT
            - s.fatigue * ATTENTION_FATIGUE_WEIGHT
            - s.stress / 100.0 * ATTENTION_STRESS_WEIGHT;
        let step = if input.interaction_level > 0.0 {
            ATTENTION_STEP_ACTIVE
        } else {
            ATTENTION_STEP_IDLE
        };
        s.attention = approach(s.attention, attention_target, step);

        let mut stress_change = -STRESS_DECAY;
        if s.attention > FOCUS_LOAD_THRESHOLD {
            stress_change += STRESS_FOCUS_LOAD;
        }
        match input.valence {
            Valence::Negative => stress_change += STRESS_NEGATIVE_SPIKE,
            Valence::Positive => stress_change -= STRESS_POSITIVE_RELIEF,
            Valence::Neutral => {}
        }
        s.stress += stress_change;

        let mut curiosity_change = -CURIOSITY_DECAY;
        if input.interaction_level > CURIOSITY_BURST_INTERACTION
            && s.engagement > CURIOSITY_BURST_ENGAGEMENT
        {
            curiosity_change += CURIOSITY_BURST;
        }
        if input.visual_scanning > SCANNING_FLOOR {
            curiosity_change += input.visual_scanning * SCANNING_GAIN;
        }
        s.curiosity += curiosity_change;

        s.attention = s.attention.clamp(METRIC_MIN, METRIC_MAX);
        s.stress = s.stress.clamp(METRIC_MIN, METRIC_MAX);
        s.curiosity = s.curiosity.clamp(METRIC_MIN, METRIC_MAX);

        CognitiveSample {
            attention: s.attention,
            stress: s.stress,
            curiosity: s.curiosity,
            timestamp,
        }
    }

    /// Accumulated fatigue in `[0, 1]`.
    #[must_use]
    pub fn fatigue(&self) -> f64 {
        self.state.fatigue
    }

    /// Current engagement in `[0, 1]`.
    #[must_use]
    pub fn engagement(&self) -> f64 {
        self.state.engagement
    }
}

/// Move `current` toward `target` by at most `step`, without overshooting.
fn approach(current: f64, target: f64, step: f64) -> f64 {
    if current < target {
        (current + step).min(target)
    } else {
        (current - step).max(target)
    }
}
