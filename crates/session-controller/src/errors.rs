//! Session controller error types.
//!
//! Every error here is scoped to a single room membership or a single peer
//! link. None of them is fatal to the process. Coaching interventions and
//! evictions are not errors; they travel as [`crate::actors::SessionEvent`]s.

use thiserror::Error;

/// Session controller error type.
///
/// Maps to numeric codes for embedding clients:
/// - `PermissionDenied`: 3
/// - `NotFound`: 4
/// - `RateLimited`: 8
/// - `Unavailable`: 9
/// - `TransportFailure`, `MediaUnavailable`: 10
/// - `Signaling`: 1
/// - Relay, Config, Internal: 6
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Room code did not resolve. Never retried automatically.
    #[error("Room not found: {0}")]
    NotFound(String),

    /// The registry could not allocate a room right now.
    #[error("Room allocation unavailable: {0}")]
    Unavailable(String),

    /// Host-only action attempted by a guest.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Too many join attempts from this origin.
    #[error("Rate limited")]
    RateLimited,

    /// A peer link reached a failed or disconnected terminal state.
    #[error("Transport failure with peer {peer}: {reason}")]
    TransportFailure { peer: String, reason: String },

    /// Local capture failed; the session continues without local media.
    #[error("Local media unavailable: {0}")]
    MediaUnavailable(String),

    /// Relay publish or subscribe failed.
    #[error("Relay error: {0}")]
    Relay(String),

    /// A relay payload could not be decoded into a signaling message.
    #[error("Malformed signaling message: {0}")]
    Signaling(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor channel closed, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns the numeric code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            SessionError::Signaling(_) => 1, // INVALID_REQUEST
            SessionError::PermissionDenied(_) => 3, // FORBIDDEN
            SessionError::NotFound(_) => 4,  // NOT_FOUND
            SessionError::Relay(_) | SessionError::Config(_) | SessionError::Internal(_) => {
                6 // INTERNAL_ERROR
            }
            SessionError::RateLimited => 8, // RATE_LIMITED
            SessionError::Unavailable(_) => 9, // UNAVAILABLE
            SessionError::TransportFailure { .. } | SessionError::MediaUnavailable(_) => 10, // MEDIA
        }
    }

    /// Returns a user-facing message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            SessionError::NotFound(_) => "Room not found or expired".to_string(),
            SessionError::Unavailable(_) => {
                "Could not create a room right now, please try again later".to_string()
            }
            SessionError::PermissionDenied(_) => "Only the host can do that".to_string(),
            SessionError::RateLimited => {
                "Too many join attempts, please wait before trying again".to_string()
            }
            SessionError::TransportFailure { .. } => {
                "Connection to a participant was lost".to_string()
            }
            SessionError::MediaUnavailable(_) => {
                "Camera or microphone unavailable, continuing without local media".to_string()
            }
            SessionError::Signaling(_)
            | SessionError::Relay(_)
            | SessionError::Config(_)
            | SessionError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
