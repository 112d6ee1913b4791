//! Metric recording helpers for the session controller.
//!
//! All metrics use the `session_` prefix. Label values are bounded:
//! - `kind`: signal message kinds (~10) or alert kinds (4)
//! - `disposition`: handled, ignored, malformed, stale
//! - `action`: warn, evict, intervene
//!
//! The recorder itself is installed by the hosting binary.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Count one signaling message.
///
/// Metric: `session_signals_total`
/// Labels: `kind`, `disposition`
pub fn record_signal(kind: &str, disposition: &str) {
    counter!(
        "session_signals_total",
        "kind" => kind.to_string(),
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

/// Count messages skipped because a relay member fell behind.
///
/// Metric: `session_relay_lagged_total`
pub fn record_relay_lag(skipped: u64) {
    counter!("session_relay_lagged_total").increment(skipped);
}

/// Set the number of peer links held by this session.
///
/// Metric: `session_links_active`
pub fn set_links_active(count: usize) {
    // usize to f64 is exact for any realistic room size
    #[allow(clippy::cast_precision_loss)]
    gauge!("session_links_active").set(count as f64);
}

/// Metric: `session_alerts_opened_total`
/// Labels: `kind` (stress, attention-drop, low-attention, low-curiosity)
pub fn record_alert_opened(kind: &str) {
    counter!("session_alerts_opened_total", "kind" => kind.to_string()).increment(1);
}

/// Metric: `session_moderation_actions_total`
/// Labels: `action` (warn, evict, intervene)
pub fn record_moderation_action(action: &str) {
    counter!("session_moderation_actions_total", "action" => action.to_string()).increment(1);
}

/// Record how long one tick of the model/alert/moderation pipeline took.
///
/// Metric: `session_tick_duration_seconds`
pub fn record_tick_duration(duration: Duration) {
    histogram!("session_tick_duration_seconds").record(duration.as_secs_f64());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_signal("offer", "handled");
        record_relay_lag(3);
        set_links_active(2);
        record_alert_opened("stress");
        record_moderation_action("evict");
        record_tick_duration(Duration::from_millis(4));
    }

    #[test]
    fn test_metrics_are_captured_by_local_recorder() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_signal("offer", "handled");
            record_signal("offer", "handled");
            record_alert_opened("stress");
            set_links_active(3);
        });

        let metrics = snapshotter.snapshot().into_vec();
        let signals = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "session_signals_total")
            .expect("signal counter recorded");
        assert_eq!(signals.3, DebugValue::Counter(2));

        assert!(metrics
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "session_alerts_opened_total"));
        assert!(metrics
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "session_links_active"));
    }
}
