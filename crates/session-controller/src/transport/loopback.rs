//! In-process transport that emulates connection establishment.
//!
//! No media moves. A loopback transport gathers two host candidates once a
//! local description exists and reports `Connected` once both descriptions
//! are installed and at least one remote candidate has been applied, so it
//! only connects if signaling actually completed.

use super::{MediaTransport, TransportEvent, TransportFactory, TransportState};
use crate::errors::SessionError;
use crate::participant::MediaFlags;
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
use async_trait::async_trait;
use common::types::ParticipantId;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

const LOOPBACK_CANDIDATES: u16 = 2;

/// Factory for [`LoopbackTransport`]s. Can sever links to simulate failures.
#[derive(Debug, Default)]
pub struct LoopbackFactory {
    events: Mutex<HashMap<(ParticipantId, ParticipantId), mpsc::UnboundedSender<TransportEvent>>>,
}

impl LoopbackFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `Disconnected` on `local`'s transport to `remote`.
    ///
    /// Returns `false` if no such transport is live.
    pub fn sever(&self, local: &ParticipantId, remote: &ParticipantId) -> bool {
        let Ok(events) = self.events.lock() else {
            return false;
        };
        events
            .get(&(local.clone(), remote.clone()))
            .is_some_and(|tx| {
                tx.send(TransportEvent::StateChanged(TransportState::Disconnected))
                    .is_ok()
            })
    }
}

impl TransportFactory for LoopbackFactory {
    fn create(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn MediaTransport>, SessionError> {
        self.events
            .lock()
            .map_err(|_| SessionError::Internal("loopback registry lock poisoned".to_string()))?
            .insert((local.clone(), remote.clone()), events.clone());
        Ok(Box::new(LoopbackTransport::new(local.clone(), remote.clone(), events)))
    }
}

/// Emulated peer connection.
#[derive(Debug)]
pub struct LoopbackTransport {
    local: ParticipantId,
    remote: ParticipantId,
    events: mpsc::UnboundedSender<TransportEvent>,
    media: MediaFlags,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    remote_candidates: usize,
    state: TransportState,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new(
        local: ParticipantId,
        remote: ParticipantId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            local,
            remote,
            events,
            media: MediaFlags::none(),
            local_description: None,
            remote_description: None,
            remote_candidates: 0,
            state: TransportState::New,
        }
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    fn describe(&self, kind: SdpKind) -> SessionDescription {
        SessionDescription {
            kind,
            sdp: format!(
                "v=0\r\no=loopback 0 0 IN IP4 127.0.0.1\r\ns={}-{}\r\na=audio:{}\r\na=video:{}\r\n",
                self.local, self.remote, self.media.has_audio, self.media.has_video
            ),
        }
    }

    fn transition(&mut self, state: TransportState) {
        if self.state == state || self.state.is_terminal() {
            return;
        }
        debug!(
            target: "session.link",
            local = %self.local,
            remote = %self.remote,
            from = self.state.as_str(),
            to = state.as_str(),
            "Loopback transport state change"
        );
        self.state = state;
        // Receiver gone means the link is being torn down
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    fn install_local(&mut self, description: SessionDescription) {
        let first = self.local_description.is_none();
        self.local_description = Some(description);
        if first {
            self.transition(TransportState::Connecting);
            for index in 0..LOOPBACK_CANDIDATES {
                let candidate = IceCandidate {
                    candidate: format!(
                        "candidate:{index} 1 udp 2122260223 127.0.0.1 {} typ host",
                        50_000 + index
                    ),
                    sdp_mid: Some("0".to_string()),
                    sdp_m_line_index: Some(0),
                };
                let _ = self.events.send(TransportEvent::LocalCandidate(candidate));
            }
        }
        self.maybe_connect();
    }

    fn maybe_connect(&mut self) {
        if self.local_description.is_some()
            && self.remote_description.is_some()
            && self.remote_candidates > 0
        {
            self.transition(TransportState::Connected);
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::TransportFailure {
                peer: self.remote.to_string(),
                reason: format!("transport is {}", self.state.as_str()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaTransport for LoopbackTransport {
    async fn attach_local_media(&mut self, media: MediaFlags) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.media = media;
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, SessionError> {
        self.ensure_open()?;
        let offer = self.describe(SdpKind::Offer);
        self.install_local(offer.clone());
        Ok(offer)
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, SessionError> {
        self.ensure_open()?;
        match &self.remote_description {
            Some(remote) if remote.kind == SdpKind::Offer => {}
            _ => {
                return Err(SessionError::Signaling(
                    "cannot answer without a remote offer".to_string(),
                ))
            }
        }
        let answer = self.describe(SdpKind::Answer);
        self.install_local(answer.clone());
        Ok(answer)
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        if description.kind == SdpKind::Answer && self.local_description.is_none() {
            return Err(SessionError::Signaling(
                "answer received without a local offer".to_string(),
            ));
        }
        self.remote_description = Some(description);
        self.maybe_connect();
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.remote_description.is_none() {
            return Err(SessionError::Signaling(format!(
                "candidate '{}' applied before remote description",
                candidate.candidate
            )));
        }
        self.remote_candidates += 1;
        self.maybe_connect();
        Ok(())
    }

    async fn close(&mut self) {
        // Local close is not reported back; the owner already knows.
        self.state = TransportState::Closed;
    }
}
