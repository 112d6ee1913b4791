//! WebSocket relay endpoint.
//!
//! Every text frame received on `/ws/rooms/:code` is forwarded verbatim to
//! every other socket attached to the same room, never back to its sender.
//! Payloads are neither parsed nor stored. A socket that falls behind loses
//! the oldest frames rather than slowing the room down.

use crate::errors::RoomError;
use crate::observability::metrics;
use crate::routes::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use common::types::RoomCode;
use session_controller::relay::RelayHub;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// `GET /ws/rooms/:code`
pub async fn relay_socket(
    State(state): State<Arc<AppState>>,
    Path(raw_code): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, RoomError> {
    let code = RoomCode::parse(&raw_code)
        .map_err(|_| RoomError::BadRequest(format!("Invalid room code: {raw_code}")))?;
    let hub = Arc::clone(&state.hub);

    Ok(ws.on_upgrade(move |socket| forward(socket, hub, code)))
}

#[instrument(skip_all, name = "room.relay.socket", fields(room = %code))]
async fn forward(mut socket: WebSocket, hub: Arc<RelayHub>, code: RoomCode) {
    let mut member = match hub.attach(&code) {
        Ok(member) => member,
        Err(e) => {
            warn!(target: "room.relay", error = %e, "Failed to attach socket to relay");
            return;
        }
    };

    metrics::relay_connection_opened();
    debug!(target: "room.relay", origin = member.origin(), "Relay socket attached");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    member.publish(text);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(target: "room.relay", error = %e, "Relay socket read failed");
                    break;
                }
            },
            outgoing = member.recv() => match outgoing {
                Some(payload) => {
                    if socket.send(Message::Text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    metrics::relay_connection_closed();
    debug!(target: "room.relay", origin = member.origin(), "Relay socket detached");
}
