//! Observability for the session controller.
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit fields;
//! participant ids appear in logs but never as metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `session_signals_total` | Counter | `kind`, `disposition` | Signaling traffic handled or dropped |
//! | `session_relay_lagged_total` | Counter | none | Messages lost to a slow relay member |
//! | `session_links_active` | Gauge | none | Peer links currently held |
//! | `session_alerts_opened_total` | Counter | `kind` | Alert openings |
//! | `session_moderation_actions_total` | Counter | `action` | Warnings, evictions, coaching |
//! | `session_tick_duration_seconds` | Histogram | none | Time spent in one tick |

pub mod metrics;

pub use metrics::{
    record_alert_opened, record_moderation_action, record_relay_lag, record_signal,
    record_tick_duration, set_links_active,
};
