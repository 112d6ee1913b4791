//! Participant records held by each room member.
//!
//! The member that owns a participant (the participant's own session) holds
//! the canonical record; everyone else holds a replica that is updated from
//! `state-update` messages.

use common::types::ParticipantId;
use serde::{Deserialize, Serialize};

/// Role within the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Host,
    Guest,
}

/// Media publication flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFlags {
    pub has_audio: bool,
    pub has_video: bool,
}

impl MediaFlags {
    /// Audio and video both published.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            has_audio: true,
            has_video: true,
        }
    }

    /// Nothing published (capture failed or disabled).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            has_audio: false,
            has_video: false,
        }
    }
}

/// Participant status. Transitions only `Active` -> `Kicked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Active,
    Kicked,
}

/// Latest metric values shown for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantMetrics {
    pub attention: f64,
    pub stress: f64,
    pub curiosity: f64,
    /// Posture penalty; 0 is upright, 100 is as bad as it gets.
    pub posture_score: f64,
}

impl Default for ParticipantMetrics {
    fn default() -> Self {
        Self {
            attention: 50.0,
            stress: 30.0,
            curiosity: 60.0,
            posture_score: 20.0,
        }
    }
}

/// Identity a member announces about itself on the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    pub id: ParticipantId,
    pub display_name: String,
    pub is_host: bool,
    pub media: MediaFlags,
}

/// A participant as tracked by one room member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub role: ParticipantRole,
    pub is_host: bool,
    pub is_local: bool,
    pub media: MediaFlags,
    pub status: ParticipantStatus,
    pub metrics: ParticipantMetrics,
}

impl Participant {
    /// Build a record from an announced identity.
    #[must_use]
    pub fn from_identity(identity: &PeerIdentity, is_local: bool) -> Self {
        Self {
            id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            role: if identity.is_host {
                ParticipantRole::Host
            } else {
                ParticipantRole::Guest
            },
            is_host: identity.is_host,
            is_local,
            media: identity.media,
            status: ParticipantStatus::Active,
            metrics: ParticipantMetrics::default(),
        }
    }

    /// Refresh identity fields from a later announcement.
    ///
    /// Status is never touched here; a kicked record stays kicked.
    pub fn apply_identity(&mut self, identity: &PeerIdentity) {
        self.display_name.clone_from(&identity.display_name);
        self.is_host = identity.is_host;
        self.role = if identity.is_host {
            ParticipantRole::Host
        } else {
            ParticipantRole::Guest
        };
        self.media = identity.media;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }

    /// Mark the participant kicked. Returns `true` only on the first call.
    pub fn mark_kicked(&mut self) -> bool {
        if self.status == ParticipantStatus::Kicked {
            return false;
        }
        self.status = ParticipantStatus::Kicked;
        true
    }

    /// Identity view of this record, for announcements.
    #[must_use]
    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            is_host: self.is_host,
            media: self.media,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn identity(id: &str, is_host: bool) -> PeerIdentity {
        PeerIdentity {
            id: ParticipantId::from(id),
            display_name: format!("{id} display"),
            is_host,
            media: MediaFlags::all(),
        }
    }

    #[test]
    fn test_kicked_is_terminal() {
        let mut p = Participant::from_identity(&identity("bob", false), false);
        assert!(p.is_active());
        assert!(p.mark_kicked());
        assert!(!p.mark_kicked());

        // A fresh announcement must not resurrect the participant
        p.apply_identity(&identity("bob", false));
        assert_eq!(p.status, ParticipantStatus::Kicked);
    }

    #[test]
    fn test_role_follows_host_flag() {
        let host = Participant::from_identity(&identity("h", true), true);
        assert_eq!(host.role, ParticipantRole::Host);

        let mut guest = Participant::from_identity(&identity("g", false), false);
        assert_eq!(guest.role, ParticipantRole::Guest);
        guest.apply_identity(&identity("g", true));
        assert_eq!(guest.role, ParticipantRole::Host);
    }
}
