//! Signaling messages exchanged between room members.
//!
//! One variant per message kind, tagged on the wire by a `type` field. The
//! relay is a broadcast, so targeted kinds carry a `target` and every member
//! filters on it; see [`SignalMessage::is_addressed_to`].

use crate::errors::SessionError;
use crate::participant::{MediaFlags, ParticipantStatus, PeerIdentity};
use common::types::ParticipantId;
use serde::{Deserialize, Serialize};

/// Which side of the handshake produced a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An opaque session description produced by the media transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

/// A network path candidate produced by the media transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Candidate line without media section hints.
    #[must_use]
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Why a participant was removed from the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionReason {
    /// Sustained poor posture.
    Slouching,
    /// Posture flag recorded as severe or inappropriate.
    SevereAppearance,
    /// Third toxicity strike.
    AbusiveLanguage,
    /// Host removed the participant by hand.
    HostDecision,
}

impl EvictionReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Slouching => "slouching",
            EvictionReason::SevereAppearance => "severe_appearance",
            EvictionReason::AbusiveLanguage => "abusive_language",
            EvictionReason::HostDecision => "host_decision",
        }
    }

    /// Text shown to the evicted participant.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            EvictionReason::Slouching => "Removed after sustained poor posture",
            EvictionReason::SevereAppearance => "Removed for inappropriate appearance",
            EvictionReason::AbusiveLanguage => "Removed for repeated abusive language",
            EvictionReason::HostDecision => "Removed by the host",
        }
    }
}

/// Host actions a target applies to itself and then re-broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum AdminCommand {
    Mute,
    DisableVideo,
    Evict { reason: EvictionReason },
}

/// A message on the room relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// A member announces itself. Re-sent on the join burst schedule.
    Join {
        sender: ParticipantId,
        identity: PeerIdentity,
    },
    /// Offering side of a handshake, addressed to the joiner.
    Offer {
        sender: ParticipantId,
        target: ParticipantId,
        sdp: SessionDescription,
        identity: PeerIdentity,
    },
    /// Answering side of a handshake.
    Answer {
        sender: ParticipantId,
        target: ParticipantId,
        sdp: SessionDescription,
    },
    /// Trickled path candidate.
    Candidate {
        sender: ParticipantId,
        target: ParticipantId,
        candidate: IceCandidate,
    },
    /// Periodic host presence beacon.
    Heartbeat {
        sender: ParticipantId,
        identity: PeerIdentity,
    },
    /// The sender is leaving the room.
    Leave { sender: ParticipantId },
    /// The sender's own canonical state, for replicas.
    StateUpdate {
        sender: ParticipantId,
        media: MediaFlags,
        status: ParticipantStatus,
        /// Set when `status` is kicked.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<EvictionReason>,
    },
    /// Host command addressed to one participant.
    Admin {
        sender: ParticipantId,
        target: ParticipantId,
        command: AdminCommand,
    },
    /// Host notice that `participant` was evicted. Repeated on the host's
    /// heartbeat until the evicted member acknowledges with a kicked
    /// `state-update`, so it survives a lost `admin`.
    Evicted {
        sender: ParticipantId,
        participant: ParticipantId,
        reason: EvictionReason,
    },
    /// Join-validation probe: is anyone in this room?
    Probe {
        sender: ParticipantId,
        nonce: String,
    },
    /// Reply to a probe.
    ProbeAck {
        sender: ParticipantId,
        target: ParticipantId,
        nonce: String,
    },
}

impl SignalMessage {
    /// The member that published this message.
    #[must_use]
    pub fn sender(&self) -> &ParticipantId {
        match self {
            SignalMessage::Join { sender, .. }
            | SignalMessage::Offer { sender, .. }
            | SignalMessage::Answer { sender, .. }
            | SignalMessage::Candidate { sender, .. }
            | SignalMessage::Heartbeat { sender, .. }
            | SignalMessage::Leave { sender }
            | SignalMessage::StateUpdate { sender, .. }
            | SignalMessage::Admin { sender, .. }
            | SignalMessage::Evicted { sender, .. }
            | SignalMessage::Probe { sender, .. }
            | SignalMessage::ProbeAck { sender, .. } => sender,
        }
    }

    /// The addressee for unicast kinds, `None` for room-wide kinds.
    #[must_use]
    pub fn target(&self) -> Option<&ParticipantId> {
        match self {
            SignalMessage::Offer { target, .. }
            | SignalMessage::Answer { target, .. }
            | SignalMessage::Candidate { target, .. }
            | SignalMessage::Admin { target, .. }
            | SignalMessage::ProbeAck { target, .. } => Some(target),
            SignalMessage::Join { .. }
            | SignalMessage::Heartbeat { .. }
            | SignalMessage::Leave { .. }
            | SignalMessage::StateUpdate { .. }
            | SignalMessage::Evicted { .. }
            | SignalMessage::Probe { .. } => None,
        }
    }

    /// Whether a member with id `local` should process this message.
    ///
    /// Own messages are never processed, and unicast messages only by their
    /// target.
    #[must_use]
    pub fn is_addressed_to(&self, local: &ParticipantId) -> bool {
        if self.sender() == local {
            return false;
        }
        self.target().map_or(true, |target| target == local)
    }

    /// Message kind, for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Join { .. } => "join",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Candidate { .. } => "candidate",
            SignalMessage::Heartbeat { .. } => "heartbeat",
            SignalMessage::Leave { .. } => "leave",
            SignalMessage::StateUpdate { .. } => "state-update",
            SignalMessage::Admin { .. } => "admin",
            SignalMessage::Evicted { .. } => "evicted",
            SignalMessage::Probe { .. } => "probe",
            SignalMessage::ProbeAck { .. } => "probe-ack",
        }
    }

    /// Encode for the relay.
    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Signaling(e.to_string()))
    }

    /// Decode a relay payload.
    pub fn decode(payload: &str) -> Result<Self, SessionError> {
        serde_json::from_str(payload).map_err(|e| SessionError::Signaling(e.to_string()))
    }
}
