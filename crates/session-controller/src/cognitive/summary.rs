//! Coarse classification of a participant's state and session history.

use std::collections::VecDeque;

use serde::Serialize;

use super::model::CognitiveSample;

/// Samples kept for the live chart.
pub const LIVE_WINDOW: usize = 30;
/// Samples kept for end-of-session insights.
pub const HISTORY_CAPACITY: usize = 5000;

const DEFAULT_SUGGESTION: &str =
    "Stay engaged and monitor your cognitive state for optimal performance.";

const FLOW_ATTENTION: f64 = 80.0;
const FLOW_STRESS: f64 = 30.0;
const HIGH_STRESS_INSIGHT: f64 = 85.0;

/// Headline reading of the latest sample. Variants are checked in
/// declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CognitiveSummary {
    CognitiveLoad,
    FlowState,
    EngagedAndCurious,
    StressedAndDistracted,
    AttentionWaning,
    HighStress,
    HighCuriosity,
    Nominal,
}

impl CognitiveSummary {
    #[must_use]
    pub fn classify(sample: &CognitiveSample) -> Self {
        let (a, s, c) = (sample.attention, sample.stress, sample.curiosity);
        if a > 75.0 && s > 65.0 {
            Self::CognitiveLoad
        } else if a > FLOW_ATTENTION && s < FLOW_STRESS {
            Self::FlowState
        } else if c > 70.0 && a > 60.0 {
            Self::EngagedAndCurious
        } else if s > 70.0 && a < 40.0 {
            Self::StressedAndDistracted
        } else if a < 30.0 {
            Self::AttentionWaning
        } else if s > 60.0 {
            Self::HighStress
        } else if c > 75.0 {
            Self::HighCuriosity
        } else {
            Self::Nominal
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::CognitiveLoad => "Cognitive Load",
            Self::FlowState => "Flow State",
            Self::EngagedAndCurious => "Engaged & Curious",
            Self::StressedAndDistracted => "Stressed & Distracted",
            Self::AttentionWaning => "Attention Waning",
            Self::HighStress => "High Stress",
            Self::HighCuriosity => "High Curiosity",
            Self::Nominal => "Nominal Engagement",
        }
    }

    #[must_use]
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::CognitiveLoad => "Consider a 2-minute mindfulness exercise to reset your focus.",
            Self::FlowState => {
                "You're in the zone! Minimize distractions to maintain this high-performance state."
            }
            Self::StressedAndDistracted => {
                "Step away for a moment. A short walk can help clear your mind and reduce stress."
            }
            Self::AttentionWaning => {
                "Try the Pomodoro Technique: 25 minutes of focused work followed by a 5-minute break."
            }
            Self::HighStress => {
                "Your stress levels are high. It's a good time for a short break or some deep breathing exercises."
            }
            Self::EngagedAndCurious | Self::HighCuriosity | Self::Nominal => DEFAULT_SUGGESTION,
        }
    }
}

/// Bounded per-participant sample history.
#[derive(Debug, Clone)]
pub struct MetricHistory {
    samples: VecDeque<CognitiveSample>,
    capacity: usize,
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl MetricHistory {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(LIVE_WINDOW)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: CognitiveSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&CognitiveSample> {
        self.samples.back()
    }

    /// The most recent [`LIVE_WINDOW`] samples, oldest first.
    pub fn live(&self) -> impl Iterator<Item = &CognitiveSample> {
        self.samples
            .iter()
            .skip(self.samples.len().saturating_sub(LIVE_WINDOW))
    }

    #[must_use]
    pub fn insights(&self) -> Option<HistoryInsights> {
        HistoryInsights::from_samples(self.samples.iter())
    }
}

/// End-of-session averages plus a one-line narrative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryInsights {
    pub average_attention: f64,
    pub average_stress: f64,
    pub average_curiosity: f64,
    pub summary: String,
}

impl HistoryInsights {
    /// `None` when fewer than two samples were recorded.
    pub fn from_samples<'a>(samples: impl Iterator<Item = &'a CognitiveSample>) -> Option<Self> {
        let mut count = 0usize;
        let (mut attention, mut stress, mut curiosity) = (0.0, 0.0, 0.0);
        let (mut high_stress, mut flow) = (0usize, 0usize);

        for sample in samples {
            count += 1;
            attention += sample.attention;
            stress += sample.stress;
            curiosity += sample.curiosity;
            if sample.stress > HIGH_STRESS_INSIGHT {
                high_stress += 1;
            }
            if sample.attention > FLOW_ATTENTION && sample.stress < FLOW_STRESS {
                flow += 1;
            }
        }

        if count < 2 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let (n, high_stress, flow) = (count as f64, high_stress as f64, flow as f64);
        let average_attention = attention / n;

        let mut summary = format!("Your average attention was {average_attention:.1}%.");
        if high_stress > n * 0.1 {
            summary.push_str(" There were several instances of high stress.");
        } else if flow > n * 0.2 {
            summary.push_str(" You spent a significant amount of time in a \"flow state.\"");
        } else {
            summary.push_str(" Stress levels remained manageable.");
        }

        Some(Self {
            average_attention,
            average_stress: stress / n,
            average_curiosity: curiosity / n,
            summary,
        })
    }
}
