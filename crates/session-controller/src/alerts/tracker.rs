//! Debounced threshold trackers.

use std::collections::VecDeque;

/// Counts consecutive ticks a condition held.
///
/// Any tick where the condition is false resets the count to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebouncedCounter {
    consecutive: u32,
    required: u32,
}

impl DebouncedCounter {
    #[must_use]
    pub const fn new(required: u32) -> Self {
        Self {
            consecutive: 0,
            required,
        }
    }

    /// Record one tick. Returns `true` once the condition has held for the
    /// required number of consecutive ticks, and on every tick after that
    /// while it keeps holding.
    pub fn observe(&mut self, condition: bool) -> bool {
        if condition {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
        self.is_satisfied()
    }

    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        self.consecutive >= self.required
    }

    #[must_use]
    pub const fn count(&self) -> u32 {
        self.consecutive
    }

    #[must_use]
    pub const fn required(&self) -> u32 {
        self.required
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

/// Which side of the threshold is the alarming side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

/// Opens after N consecutive ticks strictly beyond a threshold; recovers
/// once the metric crosses a separate recovery threshold.
#[derive(Debug, Clone)]
pub struct SustainedTracker {
    direction: Direction,
    threshold: f64,
    recovery: f64,
    counter: DebouncedCounter,
}

impl SustainedTracker {
    #[must_use]
    pub const fn new(direction: Direction, threshold: f64, ticks: u32, recovery: f64) -> Self {
        Self {
            direction,
            threshold,
            recovery,
            counter: DebouncedCounter::new(ticks),
        }
    }

    /// Whether `value` is strictly on the alarming side of the threshold.
    #[must_use]
    pub fn is_beyond(&self, value: f64) -> bool {
        match self.direction {
            Direction::Above => value > self.threshold,
            Direction::Below => value < self.threshold,
        }
    }

    #[must_use]
    pub fn is_recovered(&self, value: f64) -> bool {
        match self.direction {
            Direction::Above => value < self.recovery,
            Direction::Below => value > self.recovery,
        }
    }

    /// Feed one sample; `true` when the debounce requirement is met.
    pub fn observe(&mut self, value: f64) -> bool {
        let beyond = self.is_beyond(value);
        self.counter.observe(beyond)
    }

    /// Normalized distance past the threshold, in `[0, 1]`.
    #[must_use]
    pub fn intensity(&self, value: f64) -> f64 {
        let raw = match self.direction {
            Direction::Above => (value - self.threshold) / (100.0 - self.threshold),
            Direction::Below => (self.threshold - value) / self.threshold,
        };
        clamp_unit(raw)
    }

    #[must_use]
    pub const fn count(&self) -> u32 {
        self.counter.count()
    }

    pub fn reset(&mut self) {
        self.counter.reset();
    }
}

/// Fires when the newest sample exceeds the oldest in a full rolling window
/// by at least `min_delta`.
#[derive(Debug, Clone)]
pub struct SpikeTracker {
    window: VecDeque<f64>,
    size: usize,
    min_delta: f64,
}

impl SpikeTracker {
    #[must_use]
    pub fn new(size: usize, min_delta: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(size),
            size: size.max(2),
            min_delta,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.window.len() == self.size {
            self.window.pop_front();
        }
        self.window.push_back(value);
    }

    /// Rise across the window, once the window is full.
    #[must_use]
    pub fn rise(&self) -> Option<f64> {
        if self.window.len() < self.size {
            return None;
        }
        let oldest = self.window.front()?;
        let newest = self.window.back()?;
        Some(newest - oldest)
    }

    /// The rise, if it meets the minimum delta.
    #[must_use]
    pub fn spike(&self) -> Option<f64> {
        self.rise().filter(|rise| *rise >= self.min_delta)
    }

    #[must_use]
    pub fn intensity(&self, rise: f64) -> f64 {
        clamp_unit((rise - self.min_delta) / self.min_delta)
    }
}

/// Fires when a sample falls more than `min_drop` below the mean of the
/// preceding window. Recovers once the metric climbs back above
/// `mean - min_drop * recovery_factor`.
#[derive(Debug, Clone)]
pub struct DropTracker {
    history: VecDeque<f64>,
    size: usize,
    min_drop: f64,
    recovery_factor: f64,
}

impl DropTracker {
    #[must_use]
    pub fn new(size: usize, min_drop: f64, recovery_factor: f64) -> Self {
        Self {
            history: VecDeque::with_capacity(size),
            size: size.max(1),
            min_drop,
            recovery_factor,
        }
    }

    /// Mean of the preceding samples, `None` when empty.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let len = self.history.len() as f64;
        Some(self.history.iter().sum::<f64>() / len)
    }

    /// Drop of `value` below the preceding mean, once the window is full.
    #[must_use]
    pub fn drop_below_mean(&self, value: f64) -> Option<f64> {
        if self.history.len() < self.size {
            return None;
        }
        self.mean()
            .map(|mean| mean - value)
            .filter(|drop| *drop > self.min_drop)
    }

    #[must_use]
    pub fn is_recovered(&self, value: f64) -> bool {
        self.mean()
            .is_some_and(|mean| value > mean - self.min_drop * self.recovery_factor)
    }

    #[must_use]
    pub fn intensity(&self, drop: f64) -> f64 {
        clamp_unit((drop - self.min_drop) / (100.0 - self.min_drop))
    }

    /// Append after the sample has been evaluated.
    pub fn push(&mut self, value: f64) {
        if self.history.len() == self.size {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debounced_counter_requires_consecutive_ticks() {
        let mut counter = DebouncedCounter::new(3);
        assert!(!counter.observe(true));
        assert!(!counter.observe(true));
        assert!(!counter.observe(false));
        assert_eq!(counter.count(), 0);
        assert!(!counter.observe(true));
        assert!(!counter.observe(true));
        assert!(counter.observe(true));
        assert!(counter.observe(true));
        assert_eq!(counter.count(), 4);
    }

    #[test]
    fn test_sustained_above_is_strict() {
        let mut tracker = SustainedTracker::new(Direction::Above, 85.0, 2, 70.0);
        assert!(!tracker.observe(85.0));
        assert!(!tracker.observe(86.0));
        assert!(tracker.observe(90.0));
        assert!(!tracker.is_recovered(70.0));
        assert!(tracker.is_recovered(69.9));
    }

    #[test]
    fn test_sustained_below_intensity() {
        let tracker = SustainedTracker::new(Direction::Below, 40.0, 5, 45.0);
        assert!((tracker.intensity(20.0) - 0.5).abs() < 1e-12);
        assert_eq!(tracker.intensity(0.0), 1.0);
        assert_eq!(tracker.intensity(50.0), 0.0);
        assert!(tracker.is_recovered(45.1));
    }

    #[test]
    fn test_spike_needs_full_window() {
        let mut spike = SpikeTracker::new(3, 30.0);
        spike.push(10.0);
        spike.push(50.0);
        assert_eq!(spike.spike(), None);
        spike.push(45.0);
        assert_eq!(spike.spike(), Some(35.0));
        spike.push(46.0);
        assert_eq!(spike.spike(), None);
        assert!((spike.intensity(45.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_drop_uses_preceding_samples() {
        let mut drop = DropTracker::new(5, 35.0, 0.5);
        for _ in 0..4 {
            drop.push(80.0);
        }
        assert_eq!(drop.drop_below_mean(10.0), None);
        drop.push(80.0);
        assert_eq!(drop.drop_below_mean(45.0), None);
        assert_eq!(drop.drop_below_mean(40.0), Some(40.0));
        assert!(!drop.is_recovered(62.5));
        assert!(drop.is_recovered(62.6));
    }
}
