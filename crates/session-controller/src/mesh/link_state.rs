//! Per-peer link state machine.
//!
//! ```text
//! Idle ──StartOffer──▶ Offering ──┐
//!  │                      │       ├─TransportConnected─▶ Connected
//!  └──RemoteOffer──▶ Answering ◀──┘ (glare yield)            │
//!                                                            ▼
//!        any live state ──TransportLost──▶ Disconnected / ──Close──▶ Closed
//! ```
//!
//! `Disconnected` and `Closed` are terminal: the link is torn down and a new
//! handshake needs a new link.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Idle,
    Offering,
    Answering,
    Connected,
    Disconnected,
    Closed,
}

/// Inputs that move a link between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTrigger {
    /// We are the offering side.
    StartOffer,
    /// A remote offer arrived for this link.
    RemoteOffer,
    TransportConnected,
    TransportLost,
    Close,
}

impl LinkState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, LinkState::Disconnected | LinkState::Closed)
    }

    /// Offer or answer sent, transport not yet connected.
    #[must_use]
    pub const fn is_handshaking(self) -> bool {
        matches!(self, LinkState::Offering | LinkState::Answering)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Offering => "offering",
            LinkState::Answering => "answering",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Closed => "closed",
        }
    }

    /// Next state for `trigger`, or `None` if the transition is not allowed.
    #[must_use]
    pub const fn next(self, trigger: LinkTrigger) -> Option<LinkState> {
        use LinkState as S;
        use LinkTrigger as T;

        match (self, trigger) {
            (S::Disconnected | S::Closed, _) => None,
            (_, T::Close) => Some(S::Closed),
            (_, T::TransportLost) => Some(S::Disconnected),
            (S::Idle, T::StartOffer) => Some(S::Offering),
            (S::Idle | S::Offering, T::RemoteOffer) => Some(S::Answering),
            (S::Offering | S::Answering, T::TransportConnected) => Some(S::Connected),
            _ => None,
        }
    }
}
