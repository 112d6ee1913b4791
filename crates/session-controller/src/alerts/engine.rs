//! Per-participant alert lifecycle.
//!
//! Each kind moves `Quiet -> Open -> Quiet`. At most one record per kind is
//! open at a time; triggers while open are suppressed but the underlying
//! counters keep running. Closing is driven only by the recovery condition.
//! Intensity is fixed when the alert opens.

use super::tracker::{Direction, DropTracker, SpikeTracker, SustainedTracker};
use crate::cognitive::CognitiveSample;
use crate::observability::metrics;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

const HIGH_STRESS_THRESHOLD: f64 = 85.0;
const HIGH_STRESS_TICKS: u32 = 4;
const STRESS_RECOVERY_THRESHOLD: f64 = 70.0;
const STRESS_SPIKE_WINDOW: usize = 7;
const STRESS_SPIKE_DELTA: f64 = 30.0;

const ATTENTION_DROP_WINDOW: usize = 5;
const ATTENTION_DROP_THRESHOLD: f64 = 35.0;
const ATTENTION_RECOVERY_FACTOR: f64 = 0.5;

const LOW_ATTENTION_THRESHOLD: f64 = 35.0;
const LOW_ATTENTION_TICKS: u32 = 4;
const LOW_ATTENTION_RECOVERY: f64 = 40.0;

const LOW_CURIOSITY_THRESHOLD: f64 = 40.0;
const LOW_CURIOSITY_TICKS: u32 = 5;
const LOW_CURIOSITY_RECOVERY: f64 = 45.0;

/// Alert bucket. Sustained-high-stress and stress-spike share [`AlertKind::Stress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    Stress,
    AttentionDrop,
    LowAttention,
    LowCuriosity,
}

impl AlertKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertKind::Stress => "stress",
            AlertKind::AttentionDrop => "attention-drop",
            AlertKind::LowAttention => "low-attention",
            AlertKind::LowCuriosity => "low-curiosity",
        }
    }
}

/// Which trigger family opened an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertTrigger {
    Sustained,
    Spike,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub kind: AlertKind,
    pub trigger: AlertTrigger,
    /// Distance past threshold at open time, in `[0, 1]`.
    pub intensity: f64,
    pub active: bool,
    pub title: &'static str,
    pub message: &'static str,
    /// Engine tick on which the alert opened.
    pub opened_at_tick: u64,
}

impl AlertRecord {
    fn open(kind: AlertKind, trigger: AlertTrigger, intensity: f64, tick: u64) -> Self {
        let (title, message) = match (kind, trigger) {
            (AlertKind::Stress, AlertTrigger::Spike) => (
                "Rapid Stress Spike",
                "A sudden increase in stress was detected.",
            ),
            (AlertKind::Stress, _) => (
                "High Stress Detected",
                "Consider taking a short break to refocus.",
            ),
            (AlertKind::AttentionDrop, _) => (
                "Sudden Drop in Attention",
                "A significant distraction may have occurred.",
            ),
            (AlertKind::LowAttention, _) => (
                "Low Attention Span",
                "Focus appears to be consistently low.",
            ),
            (AlertKind::LowCuriosity, _) => (
                "Low Curiosity",
                "Interest appears to be waning. A new topic might help.",
            ),
        };
        Self {
            kind,
            trigger,
            intensity,
            active: true,
            title,
            message,
            opened_at_tick: tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlertEvent {
    Opened(AlertRecord),
    Closed(AlertRecord),
}

/// Alert state for one participant.
#[derive(Debug, Clone)]
pub struct AlertLifecycleEngine {
    tick: u64,
    high_stress: SustainedTracker,
    stress_spike: SpikeTracker,
    attention_drop: DropTracker,
    low_attention: SustainedTracker,
    low_curiosity: SustainedTracker,
    open: BTreeMap<AlertKind, AlertRecord>,
}

impl Default for AlertLifecycleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertLifecycleEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick: 0,
            high_stress: SustainedTracker::new(
                Direction::Above,
                HIGH_STRESS_THRESHOLD,
                HIGH_STRESS_TICKS,
                STRESS_RECOVERY_THRESHOLD,
            ),
            stress_spike: SpikeTracker::new(STRESS_SPIKE_WINDOW, STRESS_SPIKE_DELTA),
            attention_drop: DropTracker::new(
                ATTENTION_DROP_WINDOW,
                ATTENTION_DROP_THRESHOLD,
                ATTENTION_RECOVERY_FACTOR,
            ),
            low_attention: SustainedTracker::new(
                Direction::Below,
                LOW_ATTENTION_THRESHOLD,
                LOW_ATTENTION_TICKS,
                LOW_ATTENTION_RECOVERY,
            ),
            low_curiosity: SustainedTracker::new(
                Direction::Below,
                LOW_CURIOSITY_THRESHOLD,
                LOW_CURIOSITY_TICKS,
                LOW_CURIOSITY_RECOVERY,
            ),
            open: BTreeMap::new(),
        }
    }

    /// Feed one tick's sample and return the alerts that opened or closed.
    pub fn observe(&mut self, sample: &CognitiveSample) -> Vec<AlertEvent> {
        self.tick += 1;
        let mut events = Vec::new();

        self.observe_stress(sample.stress, &mut events);
        self.observe_attention_drop(sample.attention, &mut events);
        self.observe_low_attention(sample.attention, &mut events);
        self.observe_low_curiosity(sample.curiosity, &mut events);

        events
    }

    fn observe_stress(&mut self, stress: f64, events: &mut Vec<AlertEvent>) {
        self.stress_spike.push(stress);

        if self.is_open(AlertKind::Stress) && self.high_stress.is_recovered(stress) {
            self.close(AlertKind::Stress, events);
            self.high_stress.reset();
        }

        if !self.is_open(AlertKind::Stress) {
            if let Some(rise) = self.stress_spike.spike() {
                let intensity = self.stress_spike.intensity(rise);
                self.open(AlertKind::Stress, AlertTrigger::Spike, intensity, events);
                self.high_stress.reset();
            }
        }

        let sustained = self.high_stress.observe(stress);
        if sustained && !self.is_open(AlertKind::Stress) {
            let intensity = self.high_stress.intensity(stress);
            self.open(AlertKind::Stress, AlertTrigger::Sustained, intensity, events);
        }
    }

    fn observe_attention_drop(&mut self, attention: f64, events: &mut Vec<AlertEvent>) {
        if self.is_open(AlertKind::AttentionDrop) && self.attention_drop.is_recovered(attention) {
            self.close(AlertKind::AttentionDrop, events);
        }

        if !self.is_open(AlertKind::AttentionDrop) {
            if let Some(drop) = self.attention_drop.drop_below_mean(attention) {
                let intensity = self.attention_drop.intensity(drop);
                self.open(AlertKind::AttentionDrop, AlertTrigger::Drop, intensity, events);
            }
        }

        self.attention_drop.push(attention);
    }

    fn observe_low_attention(&mut self, attention: f64, events: &mut Vec<AlertEvent>) {
        if self.is_open(AlertKind::LowAttention) && self.low_attention.is_recovered(attention) {
            self.close(AlertKind::LowAttention, events);
            self.low_attention.reset();
        }

        let sustained = self.low_attention.observe(attention);
        if sustained && !self.is_open(AlertKind::LowAttention) {
            let intensity = self.low_attention.intensity(attention);
            self.open(AlertKind::LowAttention, AlertTrigger::Sustained, intensity, events);
        }
    }

    fn observe_low_curiosity(&mut self, curiosity: f64, events: &mut Vec<AlertEvent>) {
        if self.is_open(AlertKind::LowCuriosity) && self.low_curiosity.is_recovered(curiosity) {
            self.close(AlertKind::LowCuriosity, events);
            self.low_curiosity.reset();
        }

        let sustained = self.low_curiosity.observe(curiosity);
        if sustained && !self.is_open(AlertKind::LowCuriosity) {
            let intensity = self.low_curiosity.intensity(curiosity);
            self.open(AlertKind::LowCuriosity, AlertTrigger::Sustained, intensity, events);
        }
    }

    fn open(
        &mut self,
        kind: AlertKind,
        trigger: AlertTrigger,
        intensity: f64,
        events: &mut Vec<AlertEvent>,
    ) {
        let record = AlertRecord::open(kind, trigger, intensity, self.tick);
        debug!(
            target: "session.alerts",
            kind = kind.as_str(),
            trigger = ?trigger,
            intensity,
            tick = self.tick,
            "Alert opened"
        );
        metrics::record_alert_opened(kind.as_str());
        self.open.insert(kind, record.clone());
        events.push(AlertEvent::Opened(record));
    }

    fn close(&mut self, kind: AlertKind, events: &mut Vec<AlertEvent>) {
        if let Some(mut record) = self.open.remove(&kind) {
            record.active = false;
            debug!(
                target: "session.alerts",
                kind = kind.as_str(),
                tick = self.tick,
                "Alert closed"
            );
            events.push(AlertEvent::Closed(record));
        }
    }

    #[must_use]
    pub fn is_open(&self, kind: AlertKind) -> bool {
        self.open.contains_key(&kind)
    }

    /// Ticks the `kind` alert has been open, counting its opening tick.
    #[must_use]
    pub fn open_ticks(&self, kind: AlertKind) -> Option<u64> {
        self.open
            .get(&kind)
            .map(|record| self.tick - record.opened_at_tick + 1)
    }

    /// Currently open alerts.
    pub fn active(&self) -> impl Iterator<Item = &AlertRecord> {
        self.open.values()
    }

    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }
}
