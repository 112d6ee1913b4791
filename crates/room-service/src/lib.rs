//! Room Service Library
//!
//! Allocates short-lived room codes, gates join attempts, and relays
//! signaling traffic between the members of a room.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> registry.rs -> store.rs (Redis | memory)
//!                                \-> throttle.rs
//!               -> handlers/relay.rs -> RelayHub (session-controller)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP and WebSocket handlers
//! - `models` - Request and response bodies
//! - `observability` - Metric helpers
//! - `registry` - Room code allocation and lookup
//! - `routes` - Axum router setup
//! - `store` - Expiring key-value store seam
//! - `throttle` - Per-origin join throttle

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod registry;
pub mod routes;
pub mod store;
pub mod throttle;
