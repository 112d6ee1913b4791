//! HTTP routes for the room service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::registry::RoomRegistry;
use crate::throttle::JoinThrottle;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use session_controller::relay::RelayHub;
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: RoomRegistry,

    pub throttle: Arc<JoinThrottle>,

    /// Fan-out behind the WebSocket relay endpoint.
    pub hub: Arc<RelayHub>,

    pub config: Config,
}

/// Build the application routes.
///
/// - `/health`, `/ready`: liveness and readiness
/// - `/api/create-room`, `/api/join-room`, `/api/rooms/:code`: room API
/// - `/ws/rooms/:code`: signaling relay
/// - `/metrics`: Prometheus scrape, only when a handle is supplied
///
/// Every route gets request tracing and the configured request timeout.
pub fn build_routes(state: Arc<AppState>, metrics: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.config.request_timeout;

    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/create-room", post(handlers::create_room))
        .route("/api/join-room", post(handlers::join_room))
        .route("/api/rooms/:code", get(handlers::room_exists))
        .route("/ws/rooms/:code", get(handlers::relay_socket))
        .with_state(state);

    if let Some(handle) = metrics {
        let metrics_routes = Router::new()
            .route("/metrics", get(handlers::metrics_handler))
            .with_state(handle);
        app = app.merge(metrics_routes);
    }

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    app.layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
