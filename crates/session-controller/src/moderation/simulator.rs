//! Simulated posture and toxicity signals.
//!
//! Stands in for appearance and speech classifiers. Only the host runs it,
//! and only for remote participants.

use crate::config::SessionConfig;
use common::types::ParticipantId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;

const POSTURE_BASELINE: f64 = 20.0;
const POSTURE_EVENT_MIN: f64 = 75.0;
const POSTURE_EVENT_MAX: f64 = 100.0;
const POSTURE_DECAY: f64 = 3.0;
/// Above this the score decays after an event; below it, it wanders.
const POSTURE_SETTLED: f64 = 30.0;
const POSTURE_WALK: f64 = 2.5;
const POSTURE_PULL: f64 = 0.1;

/// Kind of posture problem recorded when a posture event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostureFlavor {
    Slouching,
    Severe,
}

/// One tick of simulated signals for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedSignals {
    /// Posture penalty in `[0, 100]`; above 50 counts as bad posture.
    pub posture_score: f64,
    /// Set on the tick a posture event fired.
    pub posture_event: Option<PostureFlavor>,
    pub toxic_event: bool,
}

#[derive(Debug)]
pub struct SignalSimulator {
    rng: StdRng,
    posture: HashMap<ParticipantId, f64>,
    posture_event_probability: f64,
    severe_share: f64,
    toxicity_probability: f64,
}

impl SignalSimulator {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        let rng = match config.simulation_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(
            rng,
            config.posture_event_probability,
            config.severe_posture_share,
            config.toxicity_probability,
        )
    }

    #[must_use]
    pub fn with_rng(
        rng: StdRng,
        posture_event_probability: f64,
        severe_share: f64,
        toxicity_probability: f64,
    ) -> Self {
        Self {
            rng,
            posture: HashMap::new(),
            posture_event_probability: probability(posture_event_probability),
            severe_share: probability(severe_share),
            toxicity_probability: probability(toxicity_probability),
        }
    }

    /// Advance `participant`'s simulated signals by one tick.
    pub fn sample(&mut self, participant: &ParticipantId) -> SimulatedSignals {
        let current = self
            .posture
            .get(participant)
            .copied()
            .unwrap_or(POSTURE_BASELINE);

        let mut posture_event = None;
        let score = if self.rng.gen_bool(self.posture_event_probability) {
            posture_event = Some(if self.rng.gen_bool(self.severe_share) {
                PostureFlavor::Severe
            } else {
                PostureFlavor::Slouching
            });
            self.rng.gen_range(POSTURE_EVENT_MIN..=POSTURE_EVENT_MAX)
        } else if current > POSTURE_SETTLED {
            current - POSTURE_DECAY
        } else {
            let noise = self.rng.gen_range(-POSTURE_WALK..=POSTURE_WALK);
            current + (POSTURE_BASELINE - current) * POSTURE_PULL + noise
        }
        .clamp(0.0, 100.0);

        self.posture.insert(participant.clone(), score);

        SimulatedSignals {
            posture_score: score,
            posture_event,
            toxic_event: self.rng.gen_bool(self.toxicity_probability),
        }
    }

    pub fn forget(&mut self, participant: &ParticipantId) {
        self.posture.remove(participant);
    }
}

fn probability(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
