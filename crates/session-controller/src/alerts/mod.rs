//! Hysteresis alerting over per-participant metric streams.
//!
//! [`tracker`] holds the reusable debounce/threshold pieces (also used by
//! moderation); [`engine`] wires them into the four alert kinds.

pub mod engine;
pub mod tracker;

pub use engine::{AlertEvent, AlertKind, AlertLifecycleEngine, AlertRecord, AlertTrigger};
pub use tracker::{DebouncedCounter, Direction, DropTracker, SpikeTracker, SustainedTracker};
