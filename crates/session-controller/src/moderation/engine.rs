//! Moderation decisions.
//!
//! Rules run every tick in priority order and at most one of them acts:
//!
//! 1. Bad posture held for [`BAD_POSTURE_TICKS`] ticks: evict, with the
//!    flavor recorded at the most recent posture event.
//! 2. [`TOXICITY_STRIKE_LIMIT`] toxicity strikes: evict.
//! 3. Stress alert open for [`STRESS_COACHING_TICKS`] ticks: coach, once per
//!    episode.
//! 4. Low attention or curiosity held for [`LOW_ENGAGEMENT_TICKS`] ticks:
//!    coach, once per episode.
//!
//! Posture flags and the first strikes are warnings on top of that.
//! Eviction is terminal. The local participant is exempt from rules 1
//! and 2.

use crate::alerts::DebouncedCounter;
use crate::cognitive::CognitiveSample;
use crate::observability::metrics;
use crate::signaling::EvictionReason;
use common::types::ParticipantId;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use super::simulator::{PostureFlavor, SimulatedSignals};

pub const BAD_POSTURE_SCORE: f64 = 50.0;
pub const BAD_POSTURE_TICKS: u32 = 10;
pub const TOXICITY_STRIKE_LIMIT: u32 = 3;
pub const STRESS_COACHING_TICKS: u64 = 15;
pub const LOW_ENGAGEMENT_TICKS: u32 = 20;
const LOW_ENGAGEMENT_ATTENTION: f64 = 35.0;
const LOW_ENGAGEMENT_CURIOSITY: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "kebab-case")]
pub enum ModerationWarning {
    PostureFlagged { flavor: PostureFlavor },
    Toxicity { strike: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterventionKind {
    StressBreak,
    Reengage,
}

impl InterventionKind {
    #[must_use]
    pub const fn suggestion(self) -> &'static str {
        match self {
            InterventionKind::StressBreak => {
                "Stress has stayed high for a while. A short break or a few deep breaths can help."
            }
            InterventionKind::Reengage => {
                "Engagement has been low for some time. Try a question or a change of topic."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum ModerationDecision {
    Warn { warning: ModerationWarning },
    Evict { reason: EvictionReason },
    Intervene { kind: InterventionKind },
}

/// Everything moderation looks at for one participant on one tick.
#[derive(Debug, Clone, Copy)]
pub struct ModerationInput<'a> {
    pub sample: &'a CognitiveSample,
    /// Ticks the stress alert has been open, `None` when it is closed.
    pub stress_alert_ticks: Option<u64>,
    /// Simulated posture/toxicity signals, when this instance simulates them.
    pub signals: Option<SimulatedSignals>,
}

/// Per-participant moderation counters.
#[derive(Debug, Clone)]
pub struct ModerationTracking {
    bad_posture: DebouncedCounter,
    last_flavor: Option<PostureFlavor>,
    toxic_strikes: u32,
    high_stress_ticks: u64,
    low_engagement: DebouncedCounter,
    stress_coached: bool,
    engagement_coached: bool,
    evicted: bool,
}

impl Default for ModerationTracking {
    fn default() -> Self {
        Self {
            bad_posture: DebouncedCounter::new(BAD_POSTURE_TICKS),
            last_flavor: None,
            toxic_strikes: 0,
            high_stress_ticks: 0,
            low_engagement: DebouncedCounter::new(LOW_ENGAGEMENT_TICKS),
            stress_coached: false,
            engagement_coached: false,
            evicted: false,
        }
    }
}

impl ModerationTracking {
    #[must_use]
    pub fn bad_posture_ticks(&self) -> u32 {
        self.bad_posture.count()
    }

    #[must_use]
    pub fn toxic_strikes(&self) -> u32 {
        self.toxic_strikes
    }

    #[must_use]
    pub fn high_stress_ticks(&self) -> u64 {
        self.high_stress_ticks
    }

    #[must_use]
    pub fn low_engagement_ticks(&self) -> u32 {
        self.low_engagement.count()
    }

    #[must_use]
    pub fn flagged_severe(&self) -> bool {
        self.last_flavor == Some(PostureFlavor::Severe)
    }

    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    fn posture_reason(&self) -> EvictionReason {
        if self.flagged_severe() {
            EvictionReason::SevereAppearance
        } else {
            EvictionReason::Slouching
        }
    }
}

/// Moderation state for every participant tracked by one room member.
#[derive(Debug)]
pub struct ModerationEngine {
    local: ParticipantId,
    tracking: HashMap<ParticipantId, ModerationTracking>,
}

impl ModerationEngine {
    #[must_use]
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            tracking: HashMap::new(),
        }
    }

    /// Run one tick of moderation for `participant`.
    pub fn evaluate(
        &mut self,
        participant: &ParticipantId,
        input: &ModerationInput<'_>,
    ) -> Vec<ModerationDecision> {
        let is_local = *participant == self.local;
        let tracking = self.tracking.entry(participant.clone()).or_default();
        let mut decisions = Vec::new();

        if tracking.evicted {
            return decisions;
        }

        if let (false, Some(signals)) = (is_local, input.signals) {
            if let Some(flavor) = signals.posture_event {
                tracking.last_flavor = Some(flavor);
                decisions.push(ModerationDecision::Warn {
                    warning: ModerationWarning::PostureFlagged { flavor },
                });
            }
            tracking
                .bad_posture
                .observe(signals.posture_score > BAD_POSTURE_SCORE);

            if signals.toxic_event {
                tracking.toxic_strikes += 1;
                if tracking.toxic_strikes < TOXICITY_STRIKE_LIMIT {
                    decisions.push(ModerationDecision::Warn {
                        warning: ModerationWarning::Toxicity {
                            strike: tracking.toxic_strikes,
                        },
                    });
                }
            }
        }

        tracking.high_stress_ticks = input.stress_alert_ticks.unwrap_or(0);
        if input.stress_alert_ticks.is_none() {
            tracking.stress_coached = false;
        }

        let sample = input.sample;
        let disengaged = sample.attention < LOW_ENGAGEMENT_ATTENTION
            || sample.curiosity < LOW_ENGAGEMENT_CURIOSITY;
        if !disengaged {
            tracking.engagement_coached = false;
        }
        tracking.low_engagement.observe(disengaged);

        let action = if tracking.bad_posture.is_satisfied() {
            Some(ModerationDecision::Evict {
                reason: tracking.posture_reason(),
            })
        } else if tracking.toxic_strikes >= TOXICITY_STRIKE_LIMIT {
            Some(ModerationDecision::Evict {
                reason: EvictionReason::AbusiveLanguage,
            })
        } else if tracking.high_stress_ticks >= STRESS_COACHING_TICKS && !tracking.stress_coached {
            tracking.stress_coached = true;
            Some(ModerationDecision::Intervene {
                kind: InterventionKind::StressBreak,
            })
        } else if tracking.low_engagement.is_satisfied() && !tracking.engagement_coached {
            tracking.engagement_coached = true;
            Some(ModerationDecision::Intervene {
                kind: InterventionKind::Reengage,
            })
        } else {
            None
        };

        if let Some(ModerationDecision::Evict { .. }) = action {
            tracking.evicted = true;
        }

        for decision in decisions.iter().chain(action.iter()) {
            log_decision(participant, decision);
        }
        decisions.extend(action);
        decisions
    }

    #[must_use]
    pub fn tracking(&self, participant: &ParticipantId) -> Option<&ModerationTracking> {
        self.tracking.get(participant)
    }

    #[must_use]
    pub fn is_evicted(&self, participant: &ParticipantId) -> bool {
        self.tracking
            .get(participant)
            .is_some_and(ModerationTracking::is_evicted)
    }

    /// Mark a participant evicted by some other path (host decision, or a
    /// kicked state learned from the room).
    pub fn mark_evicted(&mut self, participant: &ParticipantId) {
        self.tracking.entry(participant.clone()).or_default().evicted = true;
    }

    /// Drop state for a participant who left voluntarily.
    pub fn forget(&mut self, participant: &ParticipantId) {
        self.tracking.remove(participant);
    }
}

fn log_decision(participant: &ParticipantId, decision: &ModerationDecision) {
    match decision {
        ModerationDecision::Warn { warning } => {
            info!(
                target: "session.moderation",
                participant = %participant,
                warning = ?warning,
                "Participant warned"
            );
            metrics::record_moderation_action("warn");
        }
        ModerationDecision::Evict { reason } => {
            info!(
                target: "session.moderation",
                participant = %participant,
                reason = reason.as_str(),
                "Participant evicted"
            );
            metrics::record_moderation_action("evict");
        }
        ModerationDecision::Intervene { kind } => {
            info!(
                target: "session.moderation",
                participant = %participant,
                intervention = ?kind,
                "Coaching intervention"
            );
            metrics::record_moderation_action("intervene");
        }
    }
}
