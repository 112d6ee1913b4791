//! Liveness and readiness endpoints.

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Liveness: the process is serving requests.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness: pings the room store.
///
/// Returns 503 with `"status": "unavailable"` when the store is unreachable
/// so the instance is taken out of rotation without being restarted.
#[instrument(skip_all, name = "room.health.ready")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state.registry.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                store: "healthy".to_string(),
            }),
        ),
        Err(e) => {
            warn!(target: "room.health", error = %e, "Room store ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "unavailable".to_string(),
                    store: "unhealthy".to_string(),
                }),
            )
        }
    }
}
