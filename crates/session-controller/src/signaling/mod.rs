//! Signaling wire protocol carried over the relay.

pub mod messages;

pub use messages::{
    AdminCommand, EvictionReason, IceCandidate, SdpKind, SessionDescription, SignalMessage,
};
