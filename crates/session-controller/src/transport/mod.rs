//! Media transport contract.
//!
//! The session core never touches media itself. It drives an opaque
//! [`MediaTransport`] per peer: install descriptions, apply candidates, and
//! react to the [`TransportEvent`]s the transport pushes back.

pub mod loopback;

use crate::errors::SessionError;
use crate::participant::MediaFlags;
use crate::signaling::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use common::types::ParticipantId;
use tokio::sync::mpsc;
use tracing::warn;

pub use loopback::{LoopbackFactory, LoopbackTransport};

/// Connection state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// States after which the link is torn down and never retried.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TransportState::Disconnected | TransportState::Failed | TransportState::Closed
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        }
    }
}

/// Asynchronous notifications from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local candidate was gathered and should be trickled to the peer.
    LocalCandidate(IceCandidate),
    StateChanged(TransportState),
}

/// One direct media connection to one remote peer.
#[async_trait]
pub trait MediaTransport: Send {
    /// Attach local tracks matching `media`.
    async fn attach_local_media(&mut self, media: MediaFlags) -> Result<(), SessionError>;

    /// Create and install a local offer. Starts candidate gathering.
    async fn create_offer(&mut self) -> Result<SessionDescription, SessionError>;

    /// Create and install a local answer. Requires a remote offer.
    async fn create_answer(&mut self) -> Result<SessionDescription, SessionError>;

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), SessionError>;

    /// Apply a remote candidate. Fails if no remote description is installed.
    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), SessionError>;

    /// Release the connection. Idempotent.
    async fn close(&mut self);
}

/// Creates transports for new peer links.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn MediaTransport>, SessionError>;
}

/// Local capture device access.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<MediaFlags, SessionError>;
}

/// A media source with a fixed outcome.
#[derive(Debug, Clone)]
pub struct StaticMediaSource {
    outcome: Result<MediaFlags, String>,
}

impl StaticMediaSource {
    #[must_use]
    pub fn available(media: MediaFlags) -> Self {
        Self { outcome: Ok(media) }
    }

    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
        }
    }
}

#[async_trait]
impl MediaSource for StaticMediaSource {
    async fn acquire(&self) -> Result<MediaFlags, SessionError> {
        self.outcome
            .clone()
            .map_err(SessionError::MediaUnavailable)
    }
}

/// Acquire local media, degrading to audio/video off when capture fails.
pub async fn acquire_or_degrade(source: &dyn MediaSource) -> MediaFlags {
    match source.acquire().await {
        Ok(media) => media,
        Err(e) => {
            warn!(
                target: "session.link",
                error = %e,
                "Local media unavailable, continuing without audio or video"
            );
            MediaFlags::none()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TransportState::New.is_terminal());
        assert!(!TransportState::Connecting.is_terminal());
        assert!(!TransportState::Connected.is_terminal());
        assert!(TransportState::Disconnected.is_terminal());
        assert!(TransportState::Failed.is_terminal());
        assert!(TransportState::Closed.is_terminal());
    }

    #[tokio::test]
    async fn test_capture_failure_degrades_to_no_media() {
        let source = StaticMediaSource::unavailable("camera busy");
        assert_eq!(
            source.acquire().await,
            Err(SessionError::MediaUnavailable("camera busy".to_string()))
        );
        assert_eq!(acquire_or_degrade(&source).await, MediaFlags::none());

        let source = StaticMediaSource::available(MediaFlags::all());
        assert_eq!(acquire_or_degrade(&source).await, MediaFlags::all());
    }
}
