//! Loopback transports that record every call made on them.

use async_trait::async_trait;
use common::types::ParticipantId;
use session_controller::errors::SessionError;
use session_controller::participant::MediaFlags;
use session_controller::signaling::{IceCandidate, SdpKind, SessionDescription};
use session_controller::transport::{
    LoopbackTransport, MediaTransport, TransportEvent, TransportFactory,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One call on a recorded transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    AttachMedia(MediaFlags),
    CreateOffer,
    CreateAnswer,
    SetRemoteDescription(SdpKind),
    AddRemoteCandidate(String),
    Close,
}

type CallLog = Arc<Mutex<Vec<(ParticipantId, ParticipantId, TransportCall)>>>;

/// Factory producing [`LoopbackTransport`]s whose calls are logged.
#[derive(Default, Clone)]
pub struct RecordingTransportFactory {
    calls: CallLog,
    fail_create: Arc<AtomicBool>,
}

impl RecordingTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create` fail.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Calls made on `local`'s transport to `remote`, in order.
    pub fn calls_between(&self, local: &ParticipantId, remote: &ParticipantId) -> Vec<TransportCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, r, _)| l == local && r == remote)
            .map(|(_, _, call)| call.clone())
            .collect()
    }

    /// Every recorded call.
    pub fn all_calls(&self) -> Vec<(ParticipantId, ParticipantId, TransportCall)> {
        self.calls.lock().unwrap().clone()
    }
}

impl TransportFactory for RecordingTransportFactory {
    fn create(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn MediaTransport>, SessionError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SessionError::TransportFailure {
                peer: remote.to_string(),
                reason: "scripted create failure".to_string(),
            });
        }
        Ok(Box::new(RecordingTransport {
            local: local.clone(),
            remote: remote.clone(),
            inner: LoopbackTransport::new(local.clone(), remote.clone(), events),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct RecordingTransport {
    local: ParticipantId,
    remote: ParticipantId,
    inner: LoopbackTransport,
    calls: CallLog,
}

impl RecordingTransport {
    fn record(&self, call: TransportCall) {
        self.calls
            .lock()
            .unwrap()
            .push((self.local.clone(), self.remote.clone(), call));
    }
}

#[async_trait]
impl MediaTransport for RecordingTransport {
    async fn attach_local_media(&mut self, media: MediaFlags) -> Result<(), SessionError> {
        self.record(TransportCall::AttachMedia(media));
        self.inner.attach_local_media(media).await
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, SessionError> {
        self.record(TransportCall::CreateOffer);
        self.inner.create_offer().await
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, SessionError> {
        self.record(TransportCall::CreateAnswer);
        self.inner.create_answer().await
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), SessionError> {
        self.record(TransportCall::SetRemoteDescription(description.kind));
        self.inner.set_remote_description(description).await
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), SessionError> {
        self.record(TransportCall::AddRemoteCandidate(candidate.candidate.clone()));
        self.inner.add_remote_candidate(candidate).await
    }

    async fn close(&mut self) {
        self.record(TransportCall::Close);
        self.inner.close().await;
    }
}
