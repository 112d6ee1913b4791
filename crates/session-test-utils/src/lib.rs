//! Test utilities for the Cortex session controller and room service.
//!
//! Doubles for the seams the core depends on, plus fixtures for starting
//! sessions and a harness that serves the real room-service router.
//!
//! - [`LossyRelay`]: a [`SignalRelay`](session_controller::relay::SignalRelay)
//!   that drops chosen messages
//! - [`RecordingTransportFactory`]: loopback transports that log every call
//! - [`ScriptedRoomStore`]: a room store with forced conflicts and failures
//! - [`TestParticipant`]: host/guest builders producing `SessionParams`
//! - [`ConstantInputs`]: fixed cognitive input per participant
//! - [`TestRoomServer`] / [`WsRelay`]: the room service over real sockets
//! - [`wait_until`] / [`next_event`]: polling helpers

pub mod fixtures;
pub mod inputs;
pub mod lossy_relay;
pub mod recording_transport;
pub mod scripted_store;
pub mod server_harness;
pub mod wait;

pub use fixtures::{fast_config, room, TestParticipant};
pub use inputs::ConstantInputs;
pub use lossy_relay::LossyRelay;
pub use recording_transport::{RecordingTransportFactory, TransportCall};
pub use scripted_store::ScriptedRoomStore;
pub use server_harness::{TestRoomServer, WsRelay};
pub use wait::{next_event, wait_until};
