//! Room creation and join handlers.
//!
//! Join lookups and existence checks are throttled per client address
//! before anything else happens, so a throttled client learns nothing about
//! whether its code was valid.

use crate::errors::RoomError;
use crate::models::{
    CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, JoinRoomResponse, RoomExistsResponse,
};
use crate::observability::metrics;
use crate::registry::ROOM_NOT_FOUND_MESSAGE;
use crate::routes::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::Json;
use common::types::RoomCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument};

/// `POST /api/create-room`
#[instrument(skip_all, name = "room.handlers.create")]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, RoomError> {
    let host_id = non_blank(request.host_id)
        .ok_or_else(|| RoomError::BadRequest("hostId is required".to_string()))?;

    let created = state
        .registry
        .create_room(&host_id, request.meta.unwrap_or(serde_json::Value::Null))
        .await?;

    Ok(Json(CreateRoomResponse {
        code: created.code.to_string(),
        expires_in: created.expires_in.as_secs(),
    }))
}

/// `POST /api/join-room`
#[instrument(skip_all, name = "room.handlers.join", fields(origin = %addr.ip()))]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<JoinRoomResponse>, RoomError> {
    throttle(&state, addr)?;

    let (Some(raw_code), Some(user_id)) = (non_blank(request.code), non_blank(request.user_id))
    else {
        return Err(RoomError::BadRequest(
            "Code and userId are required".to_string(),
        ));
    };

    let room = match resolve(&raw_code) {
        Ok(code) => state.registry.lookup_room(&code).await,
        Err(e) => Err(e),
    }
    .inspect_err(|e| {
        if matches!(e, RoomError::NotFound(_)) {
            metrics::record_join_attempt("not_found");
        }
    })?;

    metrics::record_join_attempt("found");
    info!(target: "room.handlers", user_id = %user_id, "Join lookup succeeded");
    Ok(Json(JoinRoomResponse { room }))
}

/// `GET /api/rooms/:code`
#[instrument(skip_all, name = "room.handlers.exists", fields(origin = %addr.ip()))]
pub async fn room_exists(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(raw_code): Path<String>,
) -> Result<Json<RoomExistsResponse>, RoomError> {
    throttle(&state, addr)?;

    let code = resolve(&raw_code)?;
    if state.registry.exists(&code).await? {
        metrics::record_join_attempt("found");
        Ok(Json(RoomExistsResponse { exists: true }))
    } else {
        metrics::record_join_attempt("not_found");
        Err(RoomError::NotFound(ROOM_NOT_FOUND_MESSAGE.to_string()))
    }
}

fn throttle(state: &AppState, addr: SocketAddr) -> Result<(), RoomError> {
    state.throttle.check(addr.ip()).map_err(|retry_after| {
        metrics::record_join_attempt("rate_limited");
        RoomError::RateLimited { retry_after }
    })
}

/// A malformed code can never resolve, so it is reported like an unknown one.
fn resolve(raw: &str) -> Result<RoomCode, RoomError> {
    RoomCode::parse(raw).map_err(|_| RoomError::NotFound(ROOM_NOT_FOUND_MESSAGE.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
