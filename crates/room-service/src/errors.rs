//! Room service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Store and
//! internal failures are logged server-side and reported to clients with a
//! generic message.

use crate::store::StoreError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Room service error type.
///
/// Maps to HTTP status codes:
/// - NotFound: 404 Not Found
/// - Unavailable: 503 Service Unavailable
/// - RateLimited: 429 Too Many Requests (with `Retry-After`)
/// - BadRequest: 400 Bad Request
/// - Store, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::NotFound(_) => 404,
            RoomError::Unavailable(_) => 503,
            RoomError::RateLimited { .. } => 429,
            RoomError::BadRequest(_) => 400,
            RoomError::Store(_) | RoomError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RoomError::NotFound(message) => (StatusCode::NOT_FOUND, "NOT_FOUND", message.clone()),
            RoomError::Unavailable(message) => {
                tracing::warn!(target: "room.availability", reason = %message, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    message.clone(),
                )
            }
            RoomError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many join attempts. Please try again later.".to_string(),
            ),
            RoomError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            RoomError::Store(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "room.store", error = %err, "Room store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "An internal storage error occurred".to_string(),
                )
            }
            RoomError::Internal(reason) => {
                tracing::error!(target: "room.internal", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if let RoomError::RateLimited { retry_after } = &self {
            // Round up so a client never retries inside the window
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RoomError::NotFound("x".into()).status_code(), 404);
        assert_eq!(RoomError::Unavailable("x".into()).status_code(), 503);
        assert_eq!(
            RoomError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .status_code(),
            429
        );
        assert_eq!(RoomError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(RoomError::Internal("x".into()).status_code(), 500);
        assert_eq!(
            RoomError::Store(StoreError::Backend("down".into())).status_code(),
            500
        );
    }

    #[tokio::test]
    async fn test_not_found_response_body() {
        let response = RoomError::NotFound("Room not found or expired".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "Room not found or expired");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = RoomError::RateLimited {
            retry_after: Duration::from_millis(41_200),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_store_error_hides_details() {
        let response = RoomError::Store(StoreError::Backend(
            "connection refused to redis://:secret@cache".to_string(),
        ))
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "STORE_ERROR");
        assert!(!body.to_string().contains("secret"));
    }
}
