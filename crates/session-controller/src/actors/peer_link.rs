//! `PeerLinkActor` - one direct media connection to one remote peer.
//!
//! Each link:
//! - Owns exactly one [`MediaTransport`]
//! - Runs the offer/answer steps on its own timeline so the session's tick
//!   loop never waits on a handshake
//! - Buffers remote candidates until a remote description is installed, then
//!   applies them in arrival order
//! - Reports local descriptions, candidates and transport state back to the
//!   session, which owns the relay
//!
//! # Lifecycle
//!
//! 1. Spawned by the orchestrator on `join` (offering) or `offer` (answering)
//! 2. Runs until closed, cancelled, or the transport reaches a terminal state
//! 3. Cancellation via child token propagates from the session

use super::messages::{LinkCommand, LinkReport, LinkReportKind};
use crate::errors::SessionError;
use crate::mesh::CandidateBuffer;
use crate::participant::MediaFlags;
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
use crate::transport::{MediaTransport, TransportEvent, TransportFactory};

use common::types::ParticipantId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the link mailbox.
const LINK_CHANNEL_BUFFER: usize = 64;

/// Handle to a `PeerLinkActor`.
#[derive(Clone, Debug)]
pub struct PeerLinkHandle {
    sender: mpsc::Sender<LinkCommand>,
    cancel_token: CancellationToken,
    peer: ParticipantId,
    generation: u64,
}

impl PeerLinkHandle {
    #[must_use]
    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a command for the link.
    pub async fn send(&self, command: LinkCommand) -> Result<(), SessionError> {
        self.sender
            .send(command)
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))
    }

    /// Cancel the link actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Everything needed to spawn a link.
pub struct PeerLinkParams {
    pub local: ParticipantId,
    pub peer: ParticipantId,
    pub generation: u64,
    pub media: MediaFlags,
    pub factory: Arc<dyn TransportFactory>,
    pub reports: mpsc::UnboundedSender<LinkReport>,
}

/// The `PeerLinkActor` implementation.
pub struct PeerLinkActor {
    local: ParticipantId,
    peer: ParticipantId,
    generation: u64,
    media: MediaFlags,
    factory: Arc<dyn TransportFactory>,
    transport: Box<dyn MediaTransport>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    events_open: bool,
    receiver: mpsc::Receiver<LinkCommand>,
    reports: mpsc::UnboundedSender<LinkReport>,
    cancel_token: CancellationToken,
    /// Remote candidates waiting for a remote description.
    pending: CandidateBuffer,
    has_local_offer: bool,
    has_remote_description: bool,
    is_closing: bool,
}

impl PeerLinkActor {
    /// Spawn a new link actor.
    ///
    /// Fails only if the transport factory cannot create a transport.
    pub fn spawn(
        params: PeerLinkParams,
        cancel_token: CancellationToken,
    ) -> Result<(PeerLinkHandle, JoinHandle<()>), SessionError> {
        let (events_tx, transport_events) = mpsc::unbounded_channel();
        let transport = params
            .factory
            .create(&params.local, &params.peer, events_tx)?;
        let (sender, receiver) = mpsc::channel(LINK_CHANNEL_BUFFER);

        let handle = PeerLinkHandle {
            sender,
            cancel_token: cancel_token.clone(),
            peer: params.peer.clone(),
            generation: params.generation,
        };

        let actor = Self {
            local: params.local,
            peer: params.peer,
            generation: params.generation,
            media: params.media,
            factory: params.factory,
            transport,
            transport_events,
            events_open: true,
            receiver,
            reports: params.reports,
            cancel_token,
            pending: CandidateBuffer::new(),
            has_local_offer: false,
            has_remote_description: false,
            is_closing: false,
        };

        let task_handle = tokio::spawn(actor.run());
        Ok((handle, task_handle))
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "session.link",
        fields(local = %self.local, peer = %self.peer, generation = self.generation)
    )]
    async fn run(mut self) {
        debug!(
            target: "session.link",
            peer = %self.peer,
            generation = self.generation,
            "PeerLinkActor started"
        );

        if let Err(e) = self.transport.attach_local_media(self.media).await {
            self.fail(e);
        }

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "session.link",
                        peer = %self.peer,
                        "PeerLinkActor received cancellation signal"
                    );
                    self.close("cancelled").await;
                    break;
                }

                event = self.transport_events.recv(), if self.events_open => {
                    match event {
                        Some(event) => {
                            if self.handle_transport_event(event) {
                                self.close("transport ended").await;
                                break;
                            }
                        }
                        // Transport dropped its sender; commands still work
                        None => self.events_open = false,
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(command) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "session.link",
                                peer = %self.peer,
                                "PeerLinkActor channel closed, exiting"
                            );
                            self.close("handle dropped").await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "session.link",
            peer = %self.peer,
            generation = self.generation,
            "PeerLinkActor stopped"
        );
    }

    /// Returns true if the actor should exit.
    async fn handle_command(&mut self, command: LinkCommand) -> bool {
        match command {
            LinkCommand::StartOffer => {
                self.start_offer().await;
                false
            }
            LinkCommand::RemoteOffer { sdp } => {
                self.accept_offer(sdp).await;
                false
            }
            LinkCommand::RemoteAnswer { sdp } => {
                self.accept_answer(sdp).await;
                false
            }
            LinkCommand::RemoteCandidate { candidate } => {
                self.remote_candidate(candidate).await;
                false
            }
            LinkCommand::SetMedia { media } => {
                self.media = media;
                if let Err(e) = self.transport.attach_local_media(media).await {
                    warn!(
                        target: "session.link",
                        peer = %self.peer,
                        error = %e,
                        "Failed to update local media on link"
                    );
                }
                false
            }
            LinkCommand::Close { reason } => {
                self.close(reason).await;
                true
            }
        }
    }

    /// Returns true if the actor should exit.
    fn handle_transport_event(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.report(LinkReportKind::LocalCandidate(candidate));
                false
            }
            TransportEvent::StateChanged(state) => {
                debug!(
                    target: "session.link",
                    peer = %self.peer,
                    state = state.as_str(),
                    "Transport state changed"
                );
                self.report(LinkReportKind::StateChanged(state));
                state.is_terminal()
            }
        }
    }

    async fn start_offer(&mut self) {
        match self.transport.create_offer().await {
            Ok(offer) => {
                self.has_local_offer = true;
                self.report(LinkReportKind::LocalDescription(offer));
            }
            Err(e) => self.fail(e),
        }
    }

    async fn accept_offer(&mut self, sdp: SessionDescription) {
        if self.has_local_offer {
            // Glare and we yield: start over on a fresh transport as the
            // answering side. Buffered remote candidates carry over.
            debug!(
                target: "session.link",
                peer = %self.peer,
                "Abandoning local offer to answer remote offer"
            );
            if let Err(e) = self.reset_transport().await {
                self.fail(e);
                return;
            }
        }

        if let Err(e) = self.install_remote(sdp).await {
            self.fail(e);
            return;
        }

        match self.transport.create_answer().await {
            Ok(answer) => self.report(LinkReportKind::LocalDescription(answer)),
            Err(e) => self.fail(e),
        }
    }

    async fn accept_answer(&mut self, sdp: SessionDescription) {
        if !self.has_local_offer || self.has_remote_description {
            debug!(
                target: "session.link",
                peer = %self.peer,
                "Ignoring unexpected answer"
            );
            return;
        }
        if let Err(e) = self.install_remote(sdp).await {
            self.fail(e);
        }
    }

    /// Install the remote description, then flush buffered candidates in
    /// arrival order.
    async fn install_remote(&mut self, sdp: SessionDescription) -> Result<(), SessionError> {
        self.transport.set_remote_description(sdp).await?;
        self.has_remote_description = true;

        let buffered = self.pending.drain();
        if !buffered.is_empty() {
            debug!(
                target: "session.link",
                peer = %self.peer,
                count = buffered.len(),
                "Flushing buffered candidates"
            );
        }
        for candidate in buffered {
            self.apply_candidate(candidate).await;
        }
        Ok(())
    }

    async fn remote_candidate(&mut self, candidate: IceCandidate) {
        if self.has_remote_description {
            self.apply_candidate(candidate).await;
        } else {
            self.pending.push(candidate);
        }
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        // A bad candidate only loses one path, not the link
        if let Err(e) = self.transport.add_remote_candidate(candidate).await {
            warn!(
                target: "session.link",
                peer = %self.peer,
                error = %e,
                "Failed to apply remote candidate"
            );
        }
    }

    async fn reset_transport(&mut self) -> Result<(), SessionError> {
        self.transport.close().await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.transport = self.factory.create(&self.local, &self.peer, events_tx)?;
        self.transport_events = events_rx;
        self.events_open = true;
        self.transport.attach_local_media(self.media).await?;
        self.has_local_offer = false;
        self.has_remote_description = false;
        Ok(())
    }

    fn fail(&mut self, error: SessionError) {
        warn!(
            target: "session.link",
            peer = %self.peer,
            error = %error,
            "Link handshake step failed"
        );
        self.report(LinkReportKind::Failed(error));
    }

    fn report(&self, kind: LinkReportKind) {
        let report = LinkReport {
            peer: self.peer.clone(),
            generation: self.generation,
            kind,
        };
        // Session gone means we are being torn down
        let _ = self.reports.send(report);
    }

    async fn close(&mut self, reason: &str) {
        if self.is_closing {
            return;
        }
        self.is_closing = true;
        debug!(
            target: "session.link",
            peer = %self.peer,
            reason = %reason,
            "Closing link"
        );
        self.transport.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackFactory, TransportState};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport that records the order of calls made on it.
    struct CallLog {
        calls: Arc<Mutex<Vec<String>>>,
        remote: bool,
    }

    #[async_trait::async_trait]
    impl MediaTransport for CallLog {
        async fn attach_local_media(&mut self, _media: MediaFlags) -> Result<(), SessionError> {
            Ok(())
        }
        async fn create_offer(&mut self) -> Result<SessionDescription, SessionError> {
            self.calls.lock().unwrap().push("create_offer".to_string());
            Ok(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "offer".to_string(),
            })
        }
        async fn create_answer(&mut self) -> Result<SessionDescription, SessionError> {
            self.calls.lock().unwrap().push("create_answer".to_string());
            Ok(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "answer".to_string(),
            })
        }
        async fn set_remote_description(
            &mut self,
            _description: SessionDescription,
        ) -> Result<(), SessionError> {
            self.remote = true;
            self.calls.lock().unwrap().push("set_remote".to_string());
            Ok(())
        }
        async fn add_remote_candidate(
            &mut self,
            candidate: IceCandidate,
        ) -> Result<(), SessionError> {
            assert!(self.remote, "candidate applied before remote description");
            self.calls.lock().unwrap().push(candidate.candidate);
            Ok(())
        }
        async fn close(&mut self) {}
    }

    struct CallLogFactory {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl TransportFactory for CallLogFactory {
        fn create(
            &self,
            _local: &ParticipantId,
            _remote: &ParticipantId,
            _events: mpsc::UnboundedSender<TransportEvent>,
        ) -> Result<Box<dyn MediaTransport>, SessionError> {
            Ok(Box::new(CallLog {
                calls: Arc::clone(&self.calls),
                remote: false,
            }))
        }
    }

    fn spawn_link(
        factory: Arc<dyn TransportFactory>,
    ) -> (
        PeerLinkHandle,
        JoinHandle<()>,
        mpsc::UnboundedReceiver<LinkReport>,
    ) {
        let (reports, reports_rx) = mpsc::unbounded_channel();
        let (handle, task) = PeerLinkActor::spawn(
            PeerLinkParams {
                local: ParticipantId::from("local"),
                peer: ParticipantId::from("peer"),
                generation: 7,
                media: MediaFlags::all(),
                factory,
                reports,
            },
            CancellationToken::new(),
        )
        .unwrap();
        (handle, task, reports_rx)
    }

    #[tokio::test]
    async fn test_candidates_before_offer_applied_after_description_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(CallLogFactory {
            calls: Arc::clone(&calls),
        });
        let (handle, task, mut reports) = spawn_link(factory);

        handle
            .send(LinkCommand::RemoteCandidate {
                candidate: IceCandidate::new("c1"),
            })
            .await
            .unwrap();
        handle
            .send(LinkCommand::RemoteCandidate {
                candidate: IceCandidate::new("c2"),
            })
            .await
            .unwrap();
        handle
            .send(LinkCommand::RemoteOffer {
                sdp: SessionDescription {
                    kind: SdpKind::Offer,
                    sdp: "remote".to_string(),
                },
            })
            .await
            .unwrap();
        handle
            .send(LinkCommand::RemoteCandidate {
                candidate: IceCandidate::new("c3"),
            })
            .await
            .unwrap();

        let report = reports.recv().await.unwrap();
        assert_eq!(report.generation, 7);
        assert!(matches!(
            report.kind,
            LinkReportKind::LocalDescription(SessionDescription { kind: SdpKind::Answer, .. })
        ));

        handle.send(LinkCommand::Close { reason: "test" }).await.unwrap();
        task.await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["set_remote", "c1", "c2", "create_answer", "c3"]
        );
    }

    #[tokio::test]
    async fn test_glare_yield_restarts_as_answerer() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(CallLogFactory {
            calls: Arc::clone(&calls),
        });
        let (handle, task, mut reports) = spawn_link(factory);

        handle.send(LinkCommand::StartOffer).await.unwrap();
        handle
            .send(LinkCommand::RemoteCandidate {
                candidate: IceCandidate::new("early"),
            })
            .await
            .unwrap();
        handle
            .send(LinkCommand::RemoteOffer {
                sdp: SessionDescription {
                    kind: SdpKind::Offer,
                    sdp: "remote".to_string(),
                },
            })
            .await
            .unwrap();

        let offer = reports.recv().await.unwrap();
        assert!(matches!(
            offer.kind,
            LinkReportKind::LocalDescription(SessionDescription { kind: SdpKind::Offer, .. })
        ));
        let answer = reports.recv().await.unwrap();
        assert!(matches!(
            answer.kind,
            LinkReportKind::LocalDescription(SessionDescription { kind: SdpKind::Answer, .. })
        ));

        handle.cancel();
        task.await.unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["create_offer", "set_remote", "early", "create_answer"]
        );
    }

    #[tokio::test]
    async fn test_loopback_disconnect_reports_and_exits() {
        let factory = Arc::new(LoopbackFactory::new());
        let (handle, task, mut reports) = spawn_link(Arc::clone(&factory) as Arc<dyn TransportFactory>);

        handle.send(LinkCommand::StartOffer).await.unwrap();
        // Offer, Connecting, two candidates
        for _ in 0..4 {
            reports.recv().await.unwrap();
        }

        assert!(factory.sever(&ParticipantId::from("local"), &ParticipantId::from("peer")));
        let report = tokio::time::timeout(Duration::from_secs(1), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            report.kind,
            LinkReportKind::StateChanged(TransportState::Disconnected)
        );
        task.await.unwrap();
        assert!(handle.send(LinkCommand::StartOffer).await.is_err());
    }
}
