//! Actors for one room membership.
//!
//! ```text
//! SessionActor (one per room membership)
//! ├── owns relay link, orchestrator, monitors, moderation
//! └── PeerLinkActor (one per remote peer)
//!     └── owns one MediaTransport
//! ```
//!
//! Cancellation flows down: each link gets a child token of its session.

pub mod messages;
pub mod peer_link;
pub mod session;

pub use messages::{
    DepartureReason, LinkCommand, LinkReport, LinkReportKind, SessionCommand, SessionEvent,
    SessionSnapshot,
};
pub use peer_link::{PeerLinkActor, PeerLinkHandle, PeerLinkParams};
pub use session::{SessionActor, SessionHandle, SessionParams, SESSION_EVENT_CAPACITY};
