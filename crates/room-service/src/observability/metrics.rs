//! Metric recording helpers for the room service.
//!
//! All metrics use the `room_` prefix. Label values are bounded:
//! - `status`: success, unavailable, error
//! - `outcome`: found, not_found, rate_limited
//! - `operation`: put_if_absent, get, exists, ping

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle that renders it.
///
/// Must be called before any metric is recorded. Store latency buckets are
/// sized for a same-datacenter Redis round trip.
///
/// # Errors
///
/// Returns error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("room_store".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set store latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Metric: `room_created_total`
/// Labels: `status`
pub fn record_room_created(status: &str) {
    counter!("room_created_total", "status" => status.to_string()).increment(1);
}

/// Count a generated code that was already taken.
///
/// Metric: `room_code_collisions_total`
pub fn record_code_collision() {
    counter!("room_code_collisions_total").increment(1);
}

/// Metric: `room_join_attempts_total`
/// Labels: `outcome`
pub fn record_join_attempt(outcome: &str) {
    counter!("room_join_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Metric: `room_relay_connections`
pub fn relay_connection_opened() {
    gauge!("room_relay_connections").increment(1.0);
}

/// Metric: `room_relay_connections`
pub fn relay_connection_closed() {
    gauge!("room_relay_connections").decrement(1.0);
}

/// Record one store round trip.
///
/// Metric: `room_store_duration_seconds`
/// Labels: `operation`
pub fn record_store_duration(operation: &'static str, duration: Duration) {
    histogram!("room_store_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}
