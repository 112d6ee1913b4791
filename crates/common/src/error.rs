//! Common error types for Cortex components.

use thiserror::Error;

/// Errors raised by the shared types and helpers in this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Input could not be canonicalised into a room code
    #[error("Invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;
