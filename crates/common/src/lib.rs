//! Common utilities and types shared across Cortex components.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for room and participant identifiers
pub mod types;

/// Module for logging configuration shared by the binaries
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
