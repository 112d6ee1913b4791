//! Message types for session actor communication.

use crate::alerts::AlertRecord;
use crate::cognitive::{CognitiveSample, CognitiveSummary, HistoryInsights};
use crate::errors::SessionError;
use crate::mesh::LinkState;
use crate::moderation::{InterventionKind, ModerationWarning};
use crate::participant::{MediaFlags, Participant};
use crate::signaling::{AdminCommand, EvictionReason, IceCandidate, SessionDescription};
use crate::transport::TransportState;
use common::types::{ParticipantId, RoomCode};
use serde::Serialize;
use tokio::sync::oneshot;

/// Commands from the orchestrator to one `PeerLinkActor`.
#[derive(Debug)]
pub enum LinkCommand {
    /// Become the offering side.
    StartOffer,

    /// Install a remote offer and answer it.
    RemoteOffer { sdp: SessionDescription },

    /// Install the remote answer to our offer.
    RemoteAnswer { sdp: SessionDescription },

    /// Apply a remote candidate, or buffer it until a remote description
    /// is installed.
    RemoteCandidate { candidate: IceCandidate },

    /// Local publication changed.
    SetMedia { media: MediaFlags },

    /// Close the transport and stop.
    Close { reason: &'static str },
}

/// What a link reports back to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkReportKind {
    /// A local description to send to the peer.
    LocalDescription(SessionDescription),

    /// A local candidate to trickle to the peer.
    LocalCandidate(IceCandidate),

    /// Transport state change.
    StateChanged(TransportState),

    /// A handshake step failed; the link is unusable.
    Failed(SessionError),
}

/// A report from one link, tagged with the link generation that produced it.
///
/// Reports from a replaced link carry an older generation and are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkReport {
    pub peer: ParticipantId,
    pub generation: u64,
    pub kind: LinkReportKind,
}

/// Messages sent to a `SessionActor`.
#[derive(Debug)]
pub enum SessionCommand {
    /// Current view of the room.
    Snapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },

    /// Change what the local participant publishes.
    SetLocalMedia {
        media: MediaFlags,
        respond_to: oneshot::Sender<()>,
    },

    /// Host action against another participant.
    Admin {
        target: ParticipantId,
        command: AdminCommand,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Session insights for one tracked participant.
    Insights {
        participant: ParticipantId,
        respond_to: oneshot::Sender<Option<HistoryInsights>>,
    },

    /// Leave the room and stop.
    Leave { respond_to: oneshot::Sender<()> },
}

/// Why a participant left the local active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum DepartureReason {
    /// The participant sent `leave`.
    Voluntary,
    /// The link to the participant failed or disconnected.
    TransportFailure,
    /// The participant was evicted.
    Evicted { eviction: EvictionReason },
}

/// Domain events published by a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ParticipantJoined {
        participant: Participant,
    },
    ParticipantLeft {
        participant: ParticipantId,
        reason: DepartureReason,
    },
    LinkConnected {
        peer: ParticipantId,
    },
    MediaChanged {
        participant: ParticipantId,
        media: MediaFlags,
    },
    Metrics {
        participant: ParticipantId,
        sample: CognitiveSample,
        summary: CognitiveSummary,
    },
    AlertOpened {
        participant: ParticipantId,
        alert: AlertRecord,
    },
    AlertClosed {
        participant: ParticipantId,
        alert: AlertRecord,
    },
    Warning {
        participant: ParticipantId,
        warning: ModerationWarning,
    },
    Intervention {
        participant: ParticipantId,
        kind: InterventionKind,
        suggestion: &'static str,
    },
    /// The local participant was evicted by the host.
    LocallyEvicted {
        by: ParticipantId,
        reason: EvictionReason,
    },
    /// The session loop stopped.
    Ended,
}

/// Point-in-time view of one room membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub room: RoomCode,
    pub local: Participant,
    pub participants: Vec<Participant>,
    pub links: Vec<(ParticipantId, LinkState)>,
    pub tick: u64,
}

impl SessionSnapshot {
    /// State of the link to `peer`, if one exists.
    #[must_use]
    pub fn link_state(&self, peer: &ParticipantId) -> Option<LinkState> {
        self.links
            .iter()
            .find(|(id, _)| id == peer)
            .map(|(_, state)| *state)
    }

    /// Participants still active, excluding the local one.
    pub fn active_peers(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_active())
    }
}
