//! Room service request and response bodies.
//!
//! Field names are camelCase on the wire.

use crate::registry::RoomRecord;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/create-room`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub host_id: Option<String>,

    /// Opaque client metadata stored with the room.
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub code: String,

    /// Seconds until the code stops resolving.
    pub expires_in: u64,
}

/// Body of `POST /api/join-room`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub room: RoomRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomExistsResponse {
    pub exists: bool,
}

/// Readiness body returned by `/ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// "ready" or "unavailable".
    pub status: String,

    /// Room store connectivity ("healthy" or "unhealthy").
    pub store: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_response_uses_camel_case() {
        let body = serde_json::to_value(CreateRoomResponse {
            code: "ABCDE".to_string(),
            expires_in: 3600,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"code": "ABCDE", "expiresIn": 3600}));
    }

    #[test]
    fn test_join_request_tolerates_missing_fields() {
        let request: JoinRoomRequest = serde_json::from_str(r#"{"code": "abcde"}"#).unwrap();
        assert_eq!(request.code.as_deref(), Some("abcde"));
        assert!(request.user_id.is_none());
    }
}
