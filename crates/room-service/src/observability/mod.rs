//! Observability for the room service.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `room_created_total` | Counter | `status` | Room creation outcomes |
//! | `room_code_collisions_total` | Counter | none | Code draws that hit a live room |
//! | `room_join_attempts_total` | Counter | `outcome` | Join lookups, including throttled ones |
//! | `room_relay_connections` | Gauge | none | Open relay WebSockets |
//! | `room_store_duration_seconds` | Histogram | `operation` | Store round-trip latency |
//!
//! Room codes and origins appear in logs only, never as labels.

pub mod metrics;
