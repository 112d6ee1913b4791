//! HTTP request handlers.

pub mod health;
pub mod metrics;
pub mod relay;
pub mod rooms;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use relay::relay_socket;
pub use rooms::{create_room, join_room, room_exists};
