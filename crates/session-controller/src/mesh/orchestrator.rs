//! `PeerMeshOrchestrator` - builds and maintains one link per remote peer.
//!
//! The orchestrator is owned by a single session and is never shared. It
//! consumes relay messages and link reports and produces [`MeshOutput`]:
//! messages to publish and domain events to emit. It never touches the
//! relay itself, so it never blocks on delivery.
//!
//! Membership converges under message loss through repetition: joiners
//! announce on a burst schedule, the host sends heartbeats, anyone who sees a
//! heartbeat from an unknown member re-announces, and a duplicate `join` or
//! `offer` re-sends the cached local description and candidates. Links that
//! stay half-built past the handshake timeout re-send on their own and are
//! failed after [`MAX_HANDSHAKE_RESENDS`] attempts.
//!
//! Evictions go out twice: an `admin` to the target and an `evicted` notice
//! to the room. The host repeats the notice on its heartbeat, and answers any
//! traffic from a kicked member with a fresh `admin`, until the member
//! acknowledges with its own kicked `state-update`.

use crate::actors::messages::{
    DepartureReason, LinkCommand, LinkReport, LinkReportKind, SessionEvent,
};
use crate::actors::peer_link::{PeerLinkActor, PeerLinkHandle, PeerLinkParams};
use crate::errors::SessionError;
use crate::mesh::{CandidateBuffer, LinkState, LinkTrigger};
use crate::observability::metrics;
use crate::participant::{MediaFlags, Participant, ParticipantMetrics, ParticipantStatus, PeerIdentity};
use crate::signaling::{
    AdminCommand, EvictionReason, IceCandidate, SdpKind, SessionDescription, SignalMessage,
};
use crate::transport::{TransportFactory, TransportState};

use common::types::{ParticipantId, RoomCode};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long shutdown waits for link actors to stop.
const LINK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Re-sends of a stalled handshake before the link counts as failed.
pub const MAX_HANDSHAKE_RESENDS: u32 = 5;

/// Departed ids remembered. The oldest are forgotten first.
pub const MAX_DEPARTED: usize = 1024;

/// Peers with candidates held while no link exists.
pub const MAX_EARLY_CANDIDATE_PEERS: usize = 64;

/// How long candidates from a member absent from the roster are held.
pub const EARLY_CANDIDATE_TTL: Duration = Duration::from_secs(30);

/// Host heartbeats that repeat an unacknowledged eviction notice.
const EVICTION_NOTICE_REPEATS: u32 = 5;

/// Minimum spacing of reminders sent in reply to a kicked member's traffic.
const EVICTION_REMINDER_GAP: Duration = Duration::from_millis(500);

/// Messages to publish and events to emit after one orchestrator step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshOutput {
    pub outbound: Vec<SignalMessage>,
    pub events: Vec<SessionEvent>,
}

impl MeshOutput {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty()
    }

    pub fn merge(&mut self, other: MeshOutput) {
        self.outbound.extend(other.outbound);
        self.events.extend(other.events);
    }

    fn publish(&mut self, message: SignalMessage) {
        self.outbound.push(message);
    }

    fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }
}

struct LinkEntry {
    handle: PeerLinkHandle,
    task: JoinHandle<()>,
    state: LinkState,
    /// Last local description, re-sent when the peer shows it missed it.
    local_description: Option<SessionDescription>,
    local_candidates: Vec<IceCandidate>,
    /// Start of the current handshake attempt.
    since: Instant,
    resends: u32,
}

impl LinkEntry {
    fn advance(&mut self, trigger: LinkTrigger) -> bool {
        match self.state.next(trigger) {
            Some(next) => {
                debug!(
                    target: "session.mesh",
                    peer = %self.handle.peer(),
                    from = self.state.as_str(),
                    to = next.as_str(),
                    "Link state transition"
                );
                self.state = next;
                true
            }
            None => false,
        }
    }

    fn local_kind(&self) -> Option<SdpKind> {
        self.local_description.as_ref().map(|sdp| sdp.kind)
    }
}

/// Ids that must rejoin under a new id, bounded to [`MAX_DEPARTED`].
#[derive(Debug, Default)]
struct DepartedSet {
    order: VecDeque<ParticipantId>,
    members: HashSet<ParticipantId>,
}

impl DepartedSet {
    fn insert(&mut self, id: ParticipantId) {
        if !self.members.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > MAX_DEPARTED {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: &ParticipantId) -> bool {
        self.members.contains(id)
    }
}

struct EarlyCandidates {
    buffer: CandidateBuffer,
    first_seen: Instant,
}

/// An eviction the target has not acknowledged yet. Host only.
struct PendingEviction {
    reason: EvictionReason,
    repeats_left: u32,
    last_sent: Instant,
}

/// Per-room mesh state for one member.
pub struct PeerMeshOrchestrator {
    room: RoomCode,
    local: Participant,
    roster: HashMap<ParticipantId, Participant>,
    /// Members that left or whose link failed. They must rejoin under a new id.
    departed: DepartedSet,
    links: HashMap<ParticipantId, LinkEntry>,
    /// Candidates from peers we have no link to yet.
    early_candidates: HashMap<ParticipantId, EarlyCandidates>,
    evictions: HashMap<ParticipantId, PendingEviction>,
    retired: Vec<JoinHandle<()>>,
    factory: Arc<dyn TransportFactory>,
    reports: mpsc::UnboundedSender<LinkReport>,
    cancel_token: CancellationToken,
    next_generation: u64,
    has_left: bool,
}

impl PeerMeshOrchestrator {
    /// Create an orchestrator. Link reports arrive on the returned receiver
    /// and must be fed back through [`Self::handle_link_report`].
    #[must_use]
    pub fn new(
        room: RoomCode,
        local: Participant,
        factory: Arc<dyn TransportFactory>,
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<LinkReport>) {
        let (reports, reports_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            room,
            local,
            roster: HashMap::new(),
            departed: DepartedSet::default(),
            links: HashMap::new(),
            early_candidates: HashMap::new(),
            evictions: HashMap::new(),
            retired: Vec::new(),
            factory,
            reports,
            cancel_token,
            next_generation: 0,
            has_left: false,
        };
        (orchestrator, reports_rx)
    }

    #[must_use]
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    #[must_use]
    pub fn local(&self) -> &Participant {
        &self.local
    }

    #[must_use]
    pub fn is_host(&self) -> bool {
        self.local.is_host
    }

    /// Whether the local member was evicted or left; it no longer takes part.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.has_left || !self.local.is_active()
    }

    #[must_use]
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.roster.get(id)
    }

    /// Remote participants, including kicked ones still shown in the roster.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.roster.values()
    }

    /// Ids of remote participants in the active set.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ParticipantId> {
        self.roster
            .values()
            .filter(|p| p.is_active())
            .map(|p| p.id.clone())
            .collect()
    }

    #[must_use]
    pub fn link_state(&self, peer: &ParticipantId) -> Option<LinkState> {
        self.links.get(peer).map(|entry| entry.state)
    }

    #[must_use]
    pub fn link_states(&self) -> Vec<(ParticipantId, LinkState)> {
        let mut states: Vec<_> = self
            .links
            .iter()
            .map(|(peer, entry)| (peer.clone(), entry.state))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Latest metric values for display on a participant record.
    pub fn record_metrics(&mut self, id: &ParticipantId, values: ParticipantMetrics) {
        if *id == self.local.id {
            self.local.metrics = values;
        } else if let Some(participant) = self.roster.get_mut(id) {
            participant.metrics = values;
        }
    }

    /// `join` announcement for the burst schedule and re-announcements.
    #[must_use]
    pub fn announce(&self) -> SignalMessage {
        SignalMessage::Join {
            sender: self.local.id.clone(),
            identity: self.local.identity(),
        }
    }

    /// Host presence beacon, followed by eviction notices that have not been
    /// acknowledged and still have repeats left.
    pub fn heartbeat(&mut self) -> MeshOutput {
        let mut out = MeshOutput::default();
        out.publish(SignalMessage::Heartbeat {
            sender: self.local.id.clone(),
            identity: self.local.identity(),
        });

        let now = Instant::now();
        let mut repeated: Vec<_> = self
            .evictions
            .iter_mut()
            .filter(|(_, pending)| pending.repeats_left > 0)
            .map(|(id, pending)| {
                pending.repeats_left -= 1;
                pending.last_sent = now;
                (id.clone(), pending.reason)
            })
            .collect();
        repeated.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, reason) in repeated {
            out.publish(self.eviction_notice(&id, reason));
        }
        out
    }

    /// Re-send stalled handshakes, fail the ones out of re-sends, and drop
    /// held candidates from members that never showed up.
    pub fn check_deadlines(&mut self, handshake_timeout: Duration) -> MeshOutput {
        let mut out = MeshOutput::default();
        if self.is_finished() {
            return out;
        }
        let now = Instant::now();

        let mut stalled = Vec::new();
        let mut exhausted = Vec::new();
        for (peer, entry) in &mut self.links {
            if !entry.state.is_handshaking() || now.duration_since(entry.since) < handshake_timeout
            {
                continue;
            }
            if entry.resends >= MAX_HANDSHAKE_RESENDS {
                exhausted.push(peer.clone());
            } else {
                entry.resends += 1;
                entry.since = now;
                stalled.push((peer.clone(), entry.resends));
            }
        }
        stalled.sort();
        exhausted.sort();

        for (peer, attempt) in stalled {
            debug!(
                target: "session.mesh",
                room = %self.room,
                peer = %peer,
                attempt,
                "Handshake stalled, re-sending"
            );
            self.resend_local(&peer, &mut out);
        }
        for peer in exhausted {
            warn!(
                target: "session.mesh",
                room = %self.room,
                peer = %peer,
                "Handshake did not complete, giving up on peer"
            );
            self.teardown(&peer, DepartureReason::TransportFailure, &mut out);
        }

        let roster = &self.roster;
        self.early_candidates.retain(|id, early| {
            roster.contains_key(id) || now.duration_since(early.first_seen) < EARLY_CANDIDATE_TTL
        });
        out
    }

    /// Apply one message received from the relay.
    pub async fn handle_signal(&mut self, message: SignalMessage) -> MeshOutput {
        let mut out = MeshOutput::default();
        let kind = message.kind();

        if self.is_finished() || !message.is_addressed_to(&self.local.id) {
            metrics::record_signal(kind, "ignored");
            return out;
        }

        let sender = message.sender().clone();
        if self.is_excluded(&sender) {
            debug!(
                target: "session.mesh",
                room = %self.room,
                peer = %sender,
                kind,
                "Ignoring message from departed or kicked participant"
            );
            self.remind_evicted(&message, &mut out);
            metrics::record_signal(kind, "ignored");
            return out;
        }

        match message {
            SignalMessage::Join { identity, .. } => {
                if !self.accept_identity(&sender, &identity, kind) {
                    return out;
                }
                self.on_join(&sender, &identity, &mut out).await;
            }
            SignalMessage::Offer { sdp, identity, .. } => {
                if !self.accept_identity(&sender, &identity, kind) {
                    return out;
                }
                self.on_offer(&sender, &identity, sdp, &mut out).await;
            }
            SignalMessage::Answer { sdp, .. } => self.on_answer(&sender, sdp, &mut out).await,
            SignalMessage::Candidate { candidate, .. } => {
                self.on_candidate(&sender, candidate).await;
            }
            SignalMessage::Heartbeat { .. } => {
                if !self.roster.contains_key(&sender) {
                    debug!(
                        target: "session.mesh",
                        room = %self.room,
                        peer = %sender,
                        "Heartbeat from unknown member, re-announcing"
                    );
                    out.publish(self.announce());
                }
            }
            SignalMessage::Leave { .. } => {
                self.teardown(&sender, DepartureReason::Voluntary, &mut out);
            }
            SignalMessage::StateUpdate {
                media,
                status,
                reason,
                ..
            } => self.on_state_update(&sender, media, status, reason, &mut out),
            SignalMessage::Admin { command, .. } => {
                self.on_admin(&sender, command, &mut out).await;
            }
            SignalMessage::Evicted {
                participant,
                reason,
                ..
            } => self.on_eviction_notice(&sender, participant, reason, &mut out),
            SignalMessage::Probe { nonce, .. } => {
                out.publish(SignalMessage::ProbeAck {
                    sender: self.local.id.clone(),
                    target: sender,
                    nonce,
                });
            }
            // Probe replies are consumed by the prober's own relay link
            SignalMessage::ProbeAck { .. } => {}
        }

        metrics::record_signal(kind, "handled");
        out
    }

    /// Apply one report from a link actor.
    pub async fn handle_link_report(&mut self, report: LinkReport) -> MeshOutput {
        let mut out = MeshOutput::default();
        let peer = report.peer;

        let Some(entry) = self.links.get_mut(&peer) else {
            return out;
        };
        if entry.handle.generation() != report.generation {
            debug!(
                target: "session.mesh",
                peer = %peer,
                generation = report.generation,
                current = entry.handle.generation(),
                "Ignoring report from replaced link"
            );
            return out;
        }

        match report.kind {
            LinkReportKind::LocalDescription(sdp) => {
                entry.local_description = Some(sdp.clone());
                entry.since = Instant::now();
                let message = self.description_message(&peer, sdp);
                out.publish(message);
            }
            LinkReportKind::LocalCandidate(candidate) => {
                entry.local_candidates.push(candidate.clone());
                out.publish(SignalMessage::Candidate {
                    sender: self.local.id.clone(),
                    target: peer,
                    candidate,
                });
            }
            LinkReportKind::StateChanged(TransportState::Connected) => {
                if entry.advance(LinkTrigger::TransportConnected) {
                    info!(
                        target: "session.mesh",
                        room = %self.room,
                        peer = %peer,
                        "Peer link connected"
                    );
                    out.emit(SessionEvent::LinkConnected { peer });
                }
            }
            LinkReportKind::StateChanged(state) if state.is_terminal() => {
                warn!(
                    target: "session.mesh",
                    room = %self.room,
                    peer = %peer,
                    state = state.as_str(),
                    "Peer link lost"
                );
                self.teardown(&peer, DepartureReason::TransportFailure, &mut out);
            }
            LinkReportKind::StateChanged(_) => {}
            LinkReportKind::Failed(error) => {
                warn!(
                    target: "session.mesh",
                    room = %self.room,
                    peer = %peer,
                    error = %error,
                    "Peer link handshake failed"
                );
                self.teardown(&peer, DepartureReason::TransportFailure, &mut out);
            }
        }

        out
    }

    /// Change what the local participant publishes.
    pub async fn set_local_media(&mut self, media: MediaFlags) -> MeshOutput {
        let mut out = MeshOutput::default();
        if self.is_finished() {
            return out;
        }
        self.apply_local_media(media, &mut out).await;
        out
    }

    /// Host action against another participant.
    pub async fn admin(
        &mut self,
        target: &ParticipantId,
        command: AdminCommand,
    ) -> Result<MeshOutput, SessionError> {
        if !self.local.is_host {
            return Err(SessionError::PermissionDenied(
                "only the host can moderate participants".to_string(),
            ));
        }
        if *target == self.local.id {
            return Err(SessionError::PermissionDenied(
                "the host cannot moderate itself".to_string(),
            ));
        }
        match self.roster.get(target) {
            Some(participant) if participant.is_active() => {}
            _ => return Err(SessionError::NotFound(target.to_string())),
        }

        let mut out = MeshOutput::default();
        out.publish(SignalMessage::Admin {
            sender: self.local.id.clone(),
            target: target.clone(),
            command,
        });

        if let AdminCommand::Evict { reason } = command {
            out.publish(self.eviction_notice(target, reason));
            self.evictions.insert(
                target.clone(),
                PendingEviction {
                    reason,
                    repeats_left: EVICTION_NOTICE_REPEATS,
                    last_sent: Instant::now(),
                },
            );
            self.teardown(target, DepartureReason::Evicted { eviction: reason }, &mut out);
        }
        Ok(out)
    }

    /// Evict a participant on a moderation decision.
    pub async fn evict(
        &mut self,
        target: &ParticipantId,
        reason: EvictionReason,
    ) -> Result<MeshOutput, SessionError> {
        self.admin(target, AdminCommand::Evict { reason }).await
    }

    /// Announce departure and close every link.
    pub async fn leave(&mut self) -> MeshOutput {
        let mut out = MeshOutput::default();
        if self.has_left {
            return out;
        }
        if self.local.is_active() {
            out.publish(SignalMessage::Leave {
                sender: self.local.id.clone(),
            });
        }
        self.has_left = true;
        self.close_all_links("left room");
        out
    }

    /// Stop every link actor and wait for them to exit.
    pub async fn shutdown(&mut self) {
        self.close_all_links("session shutdown");
        let tasks: Vec<_> = self.retired.drain(..).collect();
        for task in tasks {
            match tokio::time::timeout(LINK_SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    target: "session.mesh",
                    room = %self.room,
                    error = %e,
                    "Link task panicked during shutdown"
                ),
                Err(_) => warn!(
                    target: "session.mesh",
                    room = %self.room,
                    "Link task did not stop within timeout"
                ),
            }
        }
    }

    fn is_excluded(&self, id: &ParticipantId) -> bool {
        self.departed.contains(id) || self.roster.get(id).is_some_and(|p| !p.is_active())
    }

    fn is_active_host(&self, id: &ParticipantId) -> bool {
        self.roster.get(id).is_some_and(|p| p.is_host && p.is_active())
    }

    fn eviction_notice(&self, participant: &ParticipantId, reason: EvictionReason) -> SignalMessage {
        SignalMessage::Evicted {
            sender: self.local.id.clone(),
            participant: participant.clone(),
            reason,
        }
    }

    /// Traffic from a kicked member means it has not seen its eviction. A
    /// kicked `state-update` from it is the acknowledgement.
    fn remind_evicted(&mut self, message: &SignalMessage, out: &mut MeshOutput) {
        if !self.local.is_host {
            return;
        }
        let sender = message.sender();
        if let SignalMessage::StateUpdate {
            status: ParticipantStatus::Kicked,
            ..
        } = message
        {
            if self.evictions.remove(sender).is_some() {
                debug!(
                    target: "session.mesh",
                    room = %self.room,
                    peer = %sender,
                    "Eviction acknowledged"
                );
            }
            return;
        }

        let Some(pending) = self.evictions.get_mut(sender) else {
            return;
        };
        let now = Instant::now();
        if now.duration_since(pending.last_sent) < EVICTION_REMINDER_GAP {
            return;
        }
        pending.last_sent = now;
        let reason = pending.reason;

        debug!(
            target: "session.mesh",
            room = %self.room,
            peer = %sender,
            "Kicked participant still active, repeating eviction"
        );
        out.publish(SignalMessage::Admin {
            sender: self.local.id.clone(),
            target: sender.clone(),
            command: AdminCommand::Evict { reason },
        });
        out.publish(self.eviction_notice(sender, reason));
    }

    fn accept_identity(&self, sender: &ParticipantId, identity: &PeerIdentity, kind: &str) -> bool {
        if identity.id == *sender {
            return true;
        }
        warn!(
            target: "session.mesh",
            room = %self.room,
            peer = %sender,
            "Dropping message whose identity does not match its sender"
        );
        metrics::record_signal(kind, "malformed");
        false
    }

    /// Add or refresh a roster entry. Emits `ParticipantJoined` for new ones.
    fn upsert(&mut self, identity: &PeerIdentity, out: &mut MeshOutput) {
        if let Some(existing) = self.roster.get_mut(&identity.id) {
            existing.apply_identity(identity);
            return;
        }
        let participant = Participant::from_identity(identity, false);
        info!(
            target: "session.mesh",
            room = %self.room,
            peer = %participant.id,
            is_host = participant.is_host,
            "Participant joined"
        );
        self.roster.insert(identity.id.clone(), participant.clone());
        out.emit(SessionEvent::ParticipantJoined { participant });
    }

    async fn on_join(&mut self, sender: &ParticipantId, identity: &PeerIdentity, out: &mut MeshOutput) {
        self.upsert(identity, out);

        match self.links.get(sender).map(|entry| entry.state) {
            None => {
                let Some(handle) = self.open_link(sender, LinkTrigger::StartOffer, out) else {
                    return;
                };
                self.command(&handle, LinkCommand::StartOffer).await;
            }
            // The joiner may have missed our offer: repeat it
            Some(LinkState::Offering) => self.resend_local(sender, out),
            Some(_) => {}
        }
    }

    async fn on_offer(
        &mut self,
        sender: &ParticipantId,
        identity: &PeerIdentity,
        sdp: SessionDescription,
        out: &mut MeshOutput,
    ) {
        self.upsert(identity, out);

        match self.links.get(sender).map(|entry| entry.state) {
            None => {
                let Some(handle) = self.open_link(sender, LinkTrigger::RemoteOffer, out) else {
                    return;
                };
                self.command(&handle, LinkCommand::RemoteOffer { sdp }).await;
                let early = self
                    .early_candidates
                    .remove(sender)
                    .map(|mut early| early.buffer.drain())
                    .unwrap_or_default();
                for candidate in early {
                    self.command(&handle, LinkCommand::RemoteCandidate { candidate })
                        .await;
                }
            }
            Some(LinkState::Offering) => {
                // Glare: the smaller id keeps its offer
                if self.local.id < *sender {
                    debug!(
                        target: "session.mesh",
                        peer = %sender,
                        "Glare, keeping local offer"
                    );
                    return;
                }
                debug!(
                    target: "session.mesh",
                    peer = %sender,
                    "Glare, yielding to remote offer"
                );
                let Some(entry) = self.links.get_mut(sender) else {
                    return;
                };
                entry.advance(LinkTrigger::RemoteOffer);
                entry.local_description = None;
                entry.local_candidates.clear();
                entry.since = Instant::now();
                entry.resends = 0;
                let handle = entry.handle.clone();
                self.command(&handle, LinkCommand::RemoteOffer { sdp }).await;
            }
            // The offerer may have missed our answer: repeat it
            Some(LinkState::Answering | LinkState::Connected) => {
                if self.links.get(sender).and_then(LinkEntry::local_kind) == Some(SdpKind::Answer) {
                    self.resend_local(sender, out);
                }
            }
            Some(_) => {}
        }
    }

    async fn on_answer(&mut self, sender: &ParticipantId, sdp: SessionDescription, out: &mut MeshOutput) {
        let handle = match self.links.get(sender) {
            Some(entry) if entry.state == LinkState::Offering => entry.handle.clone(),
            // A repeated answer means the answerer still lacks our candidates
            Some(entry)
                if entry.state == LinkState::Connected
                    && entry.local_kind() == Some(SdpKind::Offer) =>
            {
                self.resend_candidates(sender, out);
                return;
            }
            _ => return,
        };
        self.command(&handle, LinkCommand::RemoteAnswer { sdp }).await;
    }

    async fn on_candidate(&mut self, sender: &ParticipantId, candidate: IceCandidate) {
        match self.links.get(sender) {
            Some(entry) if !entry.state.is_terminal() => {
                let handle = entry.handle.clone();
                self.command(&handle, LinkCommand::RemoteCandidate { candidate })
                    .await;
            }
            _ => {
                if !self.early_candidates.contains_key(sender)
                    && self.early_candidates.len() >= MAX_EARLY_CANDIDATE_PEERS
                {
                    let oldest = self
                        .early_candidates
                        .iter()
                        .min_by_key(|(_, early)| early.first_seen)
                        .map(|(id, _)| id.clone());
                    if let Some(oldest) = oldest {
                        warn!(
                            target: "session.mesh",
                            room = %self.room,
                            peer = %oldest,
                            "Too many unknown candidate senders, dropping oldest"
                        );
                        self.early_candidates.remove(&oldest);
                    }
                }
                self.early_candidates
                    .entry(sender.clone())
                    .or_insert_with(|| EarlyCandidates {
                        buffer: CandidateBuffer::new(),
                        first_seen: Instant::now(),
                    })
                    .buffer
                    .push(candidate);
            }
        }
    }

    fn on_state_update(
        &mut self,
        sender: &ParticipantId,
        media: MediaFlags,
        status: ParticipantStatus,
        reason: Option<EvictionReason>,
        out: &mut MeshOutput,
    ) {
        let Some(participant) = self.roster.get_mut(sender) else {
            return;
        };
        if participant.media != media {
            participant.media = media;
            out.emit(SessionEvent::MediaChanged {
                participant: sender.clone(),
                media,
            });
        }
        if status == ParticipantStatus::Kicked {
            let eviction = reason.unwrap_or(EvictionReason::HostDecision);
            self.teardown(sender, DepartureReason::Evicted { eviction }, out);
        }
    }

    async fn on_admin(&mut self, sender: &ParticipantId, command: AdminCommand, out: &mut MeshOutput) {
        if !self.is_active_host(sender) {
            warn!(
                target: "session.mesh",
                room = %self.room,
                peer = %sender,
                "Ignoring admin command from non-host"
            );
            metrics::record_signal("admin", "rejected");
            return;
        }

        match command {
            AdminCommand::Mute => {
                let media = MediaFlags {
                    has_audio: false,
                    ..self.local.media
                };
                self.apply_local_media(media, out).await;
            }
            AdminCommand::DisableVideo => {
                let media = MediaFlags {
                    has_video: false,
                    ..self.local.media
                };
                self.apply_local_media(media, out).await;
            }
            AdminCommand::Evict { reason } => self.apply_local_eviction(sender, reason, out),
        }
    }

    /// Room-wide eviction notice. Honoured only from the active host.
    fn on_eviction_notice(
        &mut self,
        sender: &ParticipantId,
        participant: ParticipantId,
        reason: EvictionReason,
        out: &mut MeshOutput,
    ) {
        if !self.is_active_host(sender) {
            warn!(
                target: "session.mesh",
                room = %self.room,
                peer = %sender,
                "Ignoring eviction notice from non-host"
            );
            metrics::record_signal("evicted", "rejected");
            return;
        }

        if participant == self.local.id {
            self.apply_local_eviction(sender, reason, out);
        } else if self.roster.contains_key(&participant) {
            self.teardown(&participant, DepartureReason::Evicted { eviction: reason }, out);
        } else {
            // Never seen: keep a late join from bringing it in
            self.early_candidates.remove(&participant);
            self.departed.insert(participant);
        }
    }

    fn apply_local_eviction(&mut self, by: &ParticipantId, reason: EvictionReason, out: &mut MeshOutput) {
        if !self.local.mark_kicked() {
            return;
        }
        info!(
            target: "session.mesh",
            room = %self.room,
            by = %by,
            reason = reason.as_str(),
            "Evicted from room"
        );
        out.publish(SignalMessage::StateUpdate {
            sender: self.local.id.clone(),
            media: self.local.media,
            status: ParticipantStatus::Kicked,
            reason: Some(reason),
        });
        out.emit(SessionEvent::LocallyEvicted {
            by: by.clone(),
            reason,
        });
        self.close_all_links("evicted");
    }

    async fn apply_local_media(&mut self, media: MediaFlags, out: &mut MeshOutput) {
        if self.local.media == media {
            return;
        }
        self.local.media = media;
        let handles: Vec<_> = self.links.values().map(|e| e.handle.clone()).collect();
        for handle in handles {
            self.command(&handle, LinkCommand::SetMedia { media }).await;
        }
        out.publish(SignalMessage::StateUpdate {
            sender: self.local.id.clone(),
            media,
            status: self.local.status,
            reason: None,
        });
        out.emit(SessionEvent::MediaChanged {
            participant: self.local.id.clone(),
            media,
        });
    }

    fn description_message(&self, peer: &ParticipantId, sdp: SessionDescription) -> SignalMessage {
        match sdp.kind {
            SdpKind::Offer => SignalMessage::Offer {
                sender: self.local.id.clone(),
                target: peer.clone(),
                sdp,
                identity: self.local.identity(),
            },
            SdpKind::Answer => SignalMessage::Answer {
                sender: self.local.id.clone(),
                target: peer.clone(),
                sdp,
            },
        }
    }

    fn resend_local(&self, peer: &ParticipantId, out: &mut MeshOutput) {
        let Some(entry) = self.links.get(peer) else {
            return;
        };
        let Some(sdp) = entry.local_description.clone() else {
            return;
        };
        debug!(
            target: "session.mesh",
            peer = %peer,
            candidates = entry.local_candidates.len(),
            "Re-sending local description"
        );
        out.publish(self.description_message(peer, sdp));
        self.resend_candidates(peer, out);
    }

    fn resend_candidates(&self, peer: &ParticipantId, out: &mut MeshOutput) {
        let Some(entry) = self.links.get(peer) else {
            return;
        };
        for candidate in &entry.local_candidates {
            out.publish(SignalMessage::Candidate {
                sender: self.local.id.clone(),
                target: peer.clone(),
                candidate: candidate.clone(),
            });
        }
    }

    /// Spawn a link to `peer`. On failure the peer is torn down.
    fn open_link(
        &mut self,
        peer: &ParticipantId,
        trigger: LinkTrigger,
        out: &mut MeshOutput,
    ) -> Option<PeerLinkHandle> {
        self.next_generation += 1;
        let params = PeerLinkParams {
            local: self.local.id.clone(),
            peer: peer.clone(),
            generation: self.next_generation,
            media: self.local.media,
            factory: Arc::clone(&self.factory),
            reports: self.reports.clone(),
        };

        match PeerLinkActor::spawn(params, self.cancel_token.child_token()) {
            Ok((handle, task)) => {
                let mut entry = LinkEntry {
                    handle: handle.clone(),
                    task,
                    state: LinkState::Idle,
                    local_description: None,
                    local_candidates: Vec::new(),
                    since: Instant::now(),
                    resends: 0,
                };
                entry.advance(trigger);
                self.links.insert(peer.clone(), entry);
                metrics::set_links_active(self.links.len());
                Some(handle)
            }
            Err(e) => {
                warn!(
                    target: "session.mesh",
                    room = %self.room,
                    peer = %peer,
                    error = %e,
                    "Failed to create transport for peer"
                );
                self.teardown(peer, DepartureReason::TransportFailure, out);
                None
            }
        }
    }

    async fn command(&self, handle: &PeerLinkHandle, command: LinkCommand) {
        if let Err(e) = handle.send(command).await {
            // The link already stopped; its final report drives teardown
            debug!(
                target: "session.mesh",
                peer = %handle.peer(),
                error = %e,
                "Link command not delivered"
            );
        }
    }

    /// Remove `peer` from the active set and close its link.
    fn teardown(&mut self, peer: &ParticipantId, reason: DepartureReason, out: &mut MeshOutput) {
        self.early_candidates.remove(peer);
        if let Some(mut entry) = self.links.remove(peer) {
            entry.advance(match reason {
                DepartureReason::TransportFailure => LinkTrigger::TransportLost,
                DepartureReason::Voluntary | DepartureReason::Evicted { .. } => LinkTrigger::Close,
            });
            entry.handle.cancel();
            self.retire(entry.task);
            metrics::set_links_active(self.links.len());
        }

        let was_present = match reason {
            DepartureReason::Evicted { .. } => match self.roster.get_mut(peer) {
                Some(participant) => participant.mark_kicked(),
                None => false,
            },
            DepartureReason::Voluntary | DepartureReason::TransportFailure => {
                self.departed.insert(peer.clone());
                self.roster.remove(peer).is_some()
            }
        };

        if was_present {
            info!(
                target: "session.mesh",
                room = %self.room,
                peer = %peer,
                reason = ?reason,
                "Participant left"
            );
            out.emit(SessionEvent::ParticipantLeft {
                participant: peer.clone(),
                reason,
            });
        }
    }

    fn close_all_links(&mut self, reason: &'static str) {
        let peers: Vec<_> = self.links.keys().cloned().collect();
        for peer in peers {
            if let Some(mut entry) = self.links.remove(&peer) {
                entry.advance(LinkTrigger::Close);
                debug!(
                    target: "session.mesh",
                    peer = %peer,
                    reason,
                    "Closing link"
                );
                entry.handle.cancel();
                self.retire(entry.task);
            }
        }
        self.early_candidates.clear();
        metrics::set_links_active(0);
    }

    fn retire(&mut self, task: JoinHandle<()>) {
        self.retired.retain(|t| !t.is_finished());
        self.retired.push(task);
    }
}
