//! Sources of per-tick cognitive input.
//!
//! Real camera/microphone analysis is out of scope; [`VisionSignal`] keeps the
//! coarse frame heuristics and [`SimulatedInputSource`] drives the model with
//! randomized but plausible behavior.

use common::types::ParticipantId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::model::{CognitiveInput, Valence};

/// Produces the next tick's input for one participant.
pub trait CognitiveInputSource: Send {
    fn next_input(&mut self) -> CognitiveInput;
}

const DARK_FRAME_BRIGHTNESS: f64 = 30.0;
const DARK_FRAME_GAZE: f64 = 0.1;
const MOVEMENT_GAZE_SCALE: f64 = 15.0;
const SCANNING_MOVEMENT_MIN: f64 = 2.0;
const SCANNING_MOVEMENT_MAX: f64 = 12.0;
const SCANNING_MOVEMENT_PEAK: f64 = 7.0;
const SCANNING_MOVEMENT_SPREAD: f64 = 5.0;
const SMOOTHING_KEEP: f64 = 0.7;
const SMOOTHING_TAKE: f64 = 0.3;

/// Smoothed gaze and scanning estimates from frame-level measurements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionSignal {
    gaze_focus: f64,
    visual_scanning: f64,
}

impl Default for VisionSignal {
    fn default() -> Self {
        Self {
            gaze_focus: 0.5,
            visual_scanning: 0.1,
        }
    }
}

impl VisionSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one frame's mean brightness (0..255) and mean pixel movement.
    pub fn observe(&mut self, brightness: f64, movement: f64) {
        let (gaze, scanning) = if brightness < DARK_FRAME_BRIGHTNESS {
            (DARK_FRAME_GAZE, 0.0)
        } else {
            let gaze = (1.0 - movement / MOVEMENT_GAZE_SCALE).max(0.0);
            let scanning = if movement > SCANNING_MOVEMENT_MIN && movement < SCANNING_MOVEMENT_MAX {
                (1.0 - (movement - SCANNING_MOVEMENT_PEAK).abs() / SCANNING_MOVEMENT_SPREAD).max(0.0)
            } else {
                0.0
            };
            (gaze, scanning)
        };

        self.gaze_focus = self.gaze_focus * SMOOTHING_KEEP + gaze * SMOOTHING_TAKE;
        self.visual_scanning = self.visual_scanning * SMOOTHING_KEEP + scanning * SMOOTHING_TAKE;
    }

    #[must_use]
    pub fn gaze_focus(&self) -> f64 {
        self.gaze_focus
    }

    #[must_use]
    pub fn visual_scanning(&self) -> f64 {
        self.visual_scanning
    }
}

const INTERACTION_CHANCE: f64 = 0.1;
const INTERACTION_BASE: f64 = 0.6;
const INTERACTION_SPREAD: f64 = 0.3;
const INTERACTION_GAZE_WEIGHT: f64 = 0.8;
const EXPRESSION_GAZE_THRESHOLD: f64 = 0.6;
const EXPRESSION_CHANCE: f64 = 0.1;
const NEGATIVE_SHARE: f64 = 0.4;
const POSITIVE_SHARE: f64 = 0.8;
const FRAME_BRIGHTNESS: f64 = 120.0;
const MOVEMENT_MAX: f64 = 14.0;

/// Randomized input stream standing in for camera and pointer analysis.
#[derive(Debug)]
pub struct SimulatedInputSource {
    rng: StdRng,
    vision: VisionSignal,
}

impl SimulatedInputSource {
    /// Seeded source; identical seeds give identical streams.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            vision: VisionSignal::new(),
        }
    }

    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            vision: VisionSignal::new(),
        }
    }
}

impl CognitiveInputSource for SimulatedInputSource {
    fn next_input(&mut self) -> CognitiveInput {
        let movement = self.rng.gen_range(0.0..MOVEMENT_MAX);
        self.vision.observe(FRAME_BRIGHTNESS, movement);

        let interaction_level = if self.rng.gen_bool(INTERACTION_CHANCE) {
            self.rng.gen::<f64>() * INTERACTION_SPREAD + INTERACTION_BASE
        } else {
            0.0
        };

        let gaze_focus = self
            .vision
            .gaze_focus()
            .max(interaction_level * INTERACTION_GAZE_WEIGHT);

        let mut valence = Valence::Neutral;
        if gaze_focus > EXPRESSION_GAZE_THRESHOLD && self.rng.gen_bool(EXPRESSION_CHANCE) {
            let roll: f64 = self.rng.gen();
            valence = if roll < NEGATIVE_SHARE {
                Valence::Negative
            } else if roll < POSITIVE_SHARE {
                Valence::Positive
            } else {
                Valence::Neutral
            };
        }

        CognitiveInput {
            interaction_level,
            gaze_focus,
            valence,
            visual_scanning: self.vision.visual_scanning(),
        }
        .clamped()
    }
}

/// Creates one input source per tracked participant.
pub trait InputSourceFactory: Send + Sync {
    fn create(&self, participant: &ParticipantId) -> Box<dyn CognitiveInputSource>;
}

/// [`SimulatedInputSource`] per participant.
///
/// With a seed, each participant's stream is derived from the seed and its id
/// so runs are reproducible regardless of join order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedInputs {
    seed: Option<u64>,
}

impl SimulatedInputs {
    #[must_use]
    pub const fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

impl InputSourceFactory for SimulatedInputs {
    fn create(&self, participant: &ParticipantId) -> Box<dyn CognitiveInputSource> {
        match self.seed {
            Some(seed) => Box::new(SimulatedInputSource::seeded(seed ^ id_hash(participant))),
            None => Box::new(SimulatedInputSource::from_entropy()),
        }
    }
}

/// FNV-1a over the id bytes.
fn id_hash(participant: &ParticipantId) -> u64 {
    participant
        .as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}
