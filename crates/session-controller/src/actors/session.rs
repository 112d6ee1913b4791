//! `SessionActor` - one member's participation in one room.
//!
//! Each `SessionActor`:
//! - Owns the relay link for its room and the [`PeerMeshOrchestrator`]
//! - Announces itself on the join burst schedule, and sends heartbeats when
//!   it is the host
//! - Checks handshake deadlines every half handshake timeout
//! - Runs the tick loop: cognitive model, then alerts, then moderation, for
//!   the local participant and every remote replica
//! - Publishes [`SessionEvent`]s on a broadcast channel
//!
//! # Moderation authority
//!
//! Only the host simulates posture and toxicity signals, and only for remote
//! participants. Coaching rules run everywhere. Host evictions go out as an
//! `admin` command plus a room-wide `evicted` notice that rides on later
//! heartbeats; the evicted member applies whichever arrives first,
//! rebroadcasts its kicked state and stops.

use super::messages::{DepartureReason, LinkReport, SessionCommand, SessionEvent, SessionSnapshot};
use crate::alerts::{AlertEvent, AlertKind, AlertLifecycleEngine};
use crate::cognitive::{
    CognitiveInputSource, CognitiveSignalModel, CognitiveSummary, HistoryInsights,
    InputSourceFactory, MetricHistory,
};
use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::mesh::{MeshOutput, PeerMeshOrchestrator};
use crate::moderation::{ModerationDecision, ModerationEngine, ModerationInput, SignalSimulator};
use crate::observability::metrics;
use crate::participant::{MediaFlags, Participant, ParticipantMetrics, PeerIdentity};
use crate::relay::{RelayLink, SignalRelay};
use crate::signaling::{AdminCommand, EvictionReason, SignalMessage};
use crate::transport::{acquire_or_degrade, MediaSource, TransportFactory};

use common::types::{ParticipantId, RoomCode};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 64;

/// Event channel capacity. Slow subscribers lose the oldest events.
pub const SESSION_EVENT_CAPACITY: usize = 1024;

/// Everything needed to start a session.
pub struct SessionParams {
    pub room: RoomCode,
    /// Local identity. Its media flags are what the member would like to
    /// publish; capture failure degrades them.
    pub identity: PeerIdentity,
    pub config: SessionConfig,
    pub relay: Arc<dyn SignalRelay>,
    pub transports: Arc<dyn TransportFactory>,
    pub media: Arc<dyn MediaSource>,
    pub inputs: Arc<dyn InputSourceFactory>,
}

/// Handle to a `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    cancel_token: CancellationToken,
    room: RoomCode,
    local: ParticipantId,
}

impl SessionHandle {
    #[must_use]
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    #[must_use]
    pub fn local_id(&self) -> &ParticipantId {
        &self.local
    }

    /// Subscribe to session events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current view of the room.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { respond_to: tx }).await?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Change what the local participant publishes.
    pub async fn set_local_media(&self, media: MediaFlags) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::SetLocalMedia {
            media,
            respond_to: tx,
        })
        .await?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Mute another participant. Host only.
    pub async fn mute(&self, target: ParticipantId) -> Result<(), SessionError> {
        self.admin(target, AdminCommand::Mute).await
    }

    /// Turn off another participant's video. Host only.
    pub async fn disable_video(&self, target: ParticipantId) -> Result<(), SessionError> {
        self.admin(target, AdminCommand::DisableVideo).await
    }

    /// Remove another participant from the room. Host only.
    pub async fn evict(&self, target: ParticipantId) -> Result<(), SessionError> {
        self.admin(
            target,
            AdminCommand::Evict {
                reason: EvictionReason::HostDecision,
            },
        )
        .await
    }

    async fn admin(&self, target: ParticipantId, command: AdminCommand) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Admin {
            target,
            command,
            respond_to: tx,
        })
        .await?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Session insights for a tracked participant.
    pub async fn insights(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<HistoryInsights>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Insights {
            participant,
            respond_to: tx,
        })
        .await?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Announce departure, close every link and stop.
    pub async fn leave(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Leave { respond_to: tx }).await?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the session.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.sender
            .send(command)
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))
    }
}

/// Model, alerts and history for one tracked participant.
struct ParticipantMonitor {
    inputs: Box<dyn CognitiveInputSource>,
    model: CognitiveSignalModel,
    alerts: AlertLifecycleEngine,
    history: MetricHistory,
}

impl ParticipantMonitor {
    fn new(inputs: Box<dyn CognitiveInputSource>) -> Self {
        Self {
            inputs,
            model: CognitiveSignalModel::new(),
            alerts: AlertLifecycleEngine::new(),
            history: MetricHistory::default(),
        }
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    room: RoomCode,
    local_id: ParticipantId,
    config: SessionConfig,
    relay: Box<dyn RelayLink>,
    relay_open: bool,
    orchestrator: PeerMeshOrchestrator,
    link_reports: mpsc::UnboundedReceiver<LinkReport>,
    receiver: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    cancel_token: CancellationToken,
    inputs: Arc<dyn InputSourceFactory>,
    monitors: BTreeMap<ParticipantId, ParticipantMonitor>,
    moderation: ModerationEngine,
    simulator: SignalSimulator,
    join_bursts: VecDeque<Instant>,
    tick: u64,
}

impl SessionActor {
    /// Attach to the room relay and start the session.
    ///
    /// Fails if the relay cannot be reached. Local capture failure is not an
    /// error; the session continues without audio or video.
    pub async fn start(
        params: SessionParams,
        cancel_token: CancellationToken,
    ) -> Result<(SessionHandle, JoinHandle<()>), SessionError> {
        let relay = params.relay.attach(&params.room).await?;

        let mut identity = params.identity;
        let available = acquire_or_degrade(params.media.as_ref()).await;
        identity.media = MediaFlags {
            has_audio: identity.media.has_audio && available.has_audio,
            has_video: identity.media.has_video && available.has_video,
        };
        let local = Participant::from_identity(&identity, true);
        let local_id = local.id.clone();

        let (orchestrator, link_reports) = PeerMeshOrchestrator::new(
            params.room.clone(),
            local,
            params.transports,
            cancel_token.child_token(),
        );

        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        let now = Instant::now();
        let join_bursts = params
            .config
            .join_burst_offsets
            .iter()
            .map(|offset| now + *offset)
            .collect();

        let mut monitors = BTreeMap::new();
        monitors.insert(
            local_id.clone(),
            ParticipantMonitor::new(params.inputs.create(&local_id)),
        );

        let actor = Self {
            room: params.room.clone(),
            local_id: local_id.clone(),
            simulator: SignalSimulator::new(&params.config),
            config: params.config,
            relay,
            relay_open: true,
            orchestrator,
            link_reports,
            receiver,
            events: events.clone(),
            cancel_token: cancel_token.clone(),
            inputs: params.inputs,
            monitors,
            moderation: ModerationEngine::new(local_id.clone()),
            join_bursts,
            tick: 0,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionHandle {
            sender,
            events,
            cancel_token,
            room: params.room,
            local: local_id,
        };

        Ok((handle, task_handle))
    }

    /// Run the session loop.
    #[instrument(skip_all, name = "session.actor", fields(room = %self.room, local = %self.local_id))]
    async fn run(mut self) {
        info!(
            target: "session.actor",
            room = %self.room,
            local = %self.local_id,
            is_host = self.orchestrator.is_host(),
            "Session started"
        );

        let start = Instant::now();
        let mut ticker = interval_at(start + self.config.tick_interval, self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = interval_at(
            start + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let deadline_period = (self.config.handshake_timeout / 2).max(Duration::from_millis(1));
        let mut deadlines = interval_at(start + deadline_period, deadline_period);
        deadlines.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let is_host = self.orchestrator.is_host();

        loop {
            let next_burst = self.join_bursts.front().copied();

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "session.actor",
                        room = %self.room,
                        "Session received cancellation signal"
                    );
                    let out = self.orchestrator.leave().await;
                    self.apply(out).await;
                    break;
                }

                command = self.receiver.recv() => {
                    match command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "session.actor",
                                room = %self.room,
                                "Session channel closed, exiting"
                            );
                            break;
                        }
                    }
                }

                message = self.relay.recv(), if self.relay_open => {
                    match message {
                        Some(message) => {
                            let out = self.orchestrator.handle_signal(message).await;
                            self.apply(out).await;
                        }
                        None => {
                            warn!(
                                target: "session.actor",
                                room = %self.room,
                                "Relay detached, no further signaling"
                            );
                            self.relay_open = false;
                        }
                    }
                }

                Some(report) = self.link_reports.recv() => {
                    let out = self.orchestrator.handle_link_report(report).await;
                    self.apply(out).await;
                }

                _ = ticker.tick() => {
                    self.on_tick().await;
                }

                _ = heartbeat.tick(), if is_host => {
                    let out = self.orchestrator.heartbeat();
                    self.apply(out).await;
                }

                _ = deadlines.tick() => {
                    let out = self.orchestrator.check_deadlines(self.config.handshake_timeout);
                    self.apply(out).await;
                }

                () = sleep_until(next_burst.unwrap_or(start)), if next_burst.is_some() => {
                    self.join_bursts.pop_front();
                    let message = self.orchestrator.announce();
                    self.publish(&message).await;
                }
            }

            if self.orchestrator.is_finished() {
                info!(
                    target: "session.actor",
                    room = %self.room,
                    "No longer participating, stopping"
                );
                break;
            }
        }

        self.orchestrator.shutdown().await;
        self.emit(SessionEvent::Ended);

        info!(
            target: "session.actor",
            room = %self.room,
            local = %self.local_id,
            ticks = self.tick,
            "Session stopped"
        );
    }

    /// Handle one command. Returns `true` when the session should stop.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            SessionCommand::SetLocalMedia { media, respond_to } => {
                let out = self.orchestrator.set_local_media(media).await;
                self.apply(out).await;
                let _ = respond_to.send(());
            }
            SessionCommand::Admin {
                target,
                command,
                respond_to,
            } => {
                let result = match self.orchestrator.admin(&target, command).await {
                    Ok(out) => {
                        self.apply(out).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = respond_to.send(result);
            }
            SessionCommand::Insights {
                participant,
                respond_to,
            } => {
                let insights = self
                    .monitors
                    .get(&participant)
                    .and_then(|monitor| monitor.history.insights());
                let _ = respond_to.send(insights);
            }
            SessionCommand::Leave { respond_to } => {
                info!(
                    target: "session.actor",
                    room = %self.room,
                    "Leaving room"
                );
                let out = self.orchestrator.leave().await;
                self.apply(out).await;
                let _ = respond_to.send(());
                return true;
            }
        }
        false
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut participants: Vec<Participant> = self.orchestrator.participants().cloned().collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));
        SessionSnapshot {
            room: self.room.clone(),
            local: self.orchestrator.local().clone(),
            participants,
            links: self.orchestrator.link_states(),
            tick: self.tick,
        }
    }

    /// One pass of model, alerts and moderation over every tracked participant.
    async fn on_tick(&mut self) {
        let started = std::time::Instant::now();
        self.tick += 1;

        let is_host = self.orchestrator.is_host();
        let mut events = Vec::new();
        let mut evictions = Vec::new();

        for (id, monitor) in &mut self.monitors {
            let input = monitor.inputs.next_input();
            let sample = monitor.model.update(input);
            monitor.history.push(sample);

            for event in monitor.alerts.observe(&sample) {
                events.push(match event {
                    AlertEvent::Opened(alert) => SessionEvent::AlertOpened {
                        participant: id.clone(),
                        alert,
                    },
                    AlertEvent::Closed(alert) => SessionEvent::AlertClosed {
                        participant: id.clone(),
                        alert,
                    },
                });
            }

            let signals = (is_host && *id != self.local_id).then(|| self.simulator.sample(id));
            let input = ModerationInput {
                sample: &sample,
                stress_alert_ticks: monitor.alerts.open_ticks(AlertKind::Stress),
                signals,
            };
            for decision in self.moderation.evaluate(id, &input) {
                match decision {
                    ModerationDecision::Warn { warning } => events.push(SessionEvent::Warning {
                        participant: id.clone(),
                        warning,
                    }),
                    ModerationDecision::Intervene { kind } => {
                        events.push(SessionEvent::Intervention {
                            participant: id.clone(),
                            kind,
                            suggestion: kind.suggestion(),
                        });
                    }
                    ModerationDecision::Evict { reason } => evictions.push((id.clone(), reason)),
                }
            }

            self.orchestrator.record_metrics(
                id,
                ParticipantMetrics {
                    attention: sample.attention,
                    stress: sample.stress,
                    curiosity: sample.curiosity,
                    posture_score: signals
                        .map_or(ParticipantMetrics::default().posture_score, |s| s.posture_score),
                },
            );
            events.push(SessionEvent::Metrics {
                participant: id.clone(),
                sample,
                summary: CognitiveSummary::classify(&sample),
            });
        }

        for event in events {
            self.emit(event);
        }

        for (target, reason) in evictions {
            match self.orchestrator.evict(&target, reason).await {
                Ok(out) => self.apply(out).await,
                Err(e) => debug!(
                    target: "session.actor",
                    room = %self.room,
                    peer = %target,
                    error = %e,
                    "Eviction not applied"
                ),
            }
        }

        metrics::record_tick_duration(started.elapsed());
    }

    /// Publish an orchestrator step's messages and apply its events.
    async fn apply(&mut self, out: MeshOutput) {
        for message in &out.outbound {
            self.publish(message).await;
        }
        for event in out.events {
            self.track(&event);
            self.emit(event);
        }
    }

    /// Keep the monitor set in step with the active set.
    fn track(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::ParticipantJoined { participant } => {
                if participant.is_active() && !self.monitors.contains_key(&participant.id) {
                    let inputs = self.inputs.create(&participant.id);
                    self.monitors
                        .insert(participant.id.clone(), ParticipantMonitor::new(inputs));
                }
            }
            SessionEvent::ParticipantLeft {
                participant,
                reason,
            } => {
                self.monitors.remove(participant);
                self.simulator.forget(participant);
                match reason {
                    DepartureReason::Evicted { .. } => self.moderation.mark_evicted(participant),
                    DepartureReason::Voluntary | DepartureReason::TransportFailure => {
                        self.moderation.forget(participant);
                    }
                }
            }
            _ => {}
        }
    }

    async fn publish(&mut self, message: &SignalMessage) {
        if !self.relay_open {
            return;
        }
        if let Err(e) = self.relay.publish(message).await {
            warn!(
                target: "session.actor",
                room = %self.room,
                kind = message.kind(),
                error = %e,
                "Relay publish failed"
            );
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cognitive::SimulatedInputs;
    use crate::relay::{LocalRelay, RelayHub};
    use crate::transport::{LoopbackFactory, StaticMediaSource};

    fn params(hub: &Arc<RelayHub>, id: &str, is_host: bool, media: StaticMediaSource) -> SessionParams {
        SessionParams {
            room: RoomCode::parse("ROOM1").unwrap(),
            identity: PeerIdentity {
                id: ParticipantId::from(id),
                display_name: id.to_string(),
                is_host,
                media: MediaFlags::all(),
            },
            config: SessionConfig {
                simulation_seed: Some(1),
                posture_event_probability: 0.0,
                toxicity_probability: 0.0,
                ..SessionConfig::default()
            },
            relay: Arc::new(LocalRelay::new(Arc::clone(hub))),
            transports: Arc::new(LoopbackFactory::new()),
            media: Arc::new(media),
            inputs: Arc::new(SimulatedInputs::new(Some(1))),
        }
    }

    #[tokio::test]
    async fn test_session_start_and_snapshot() {
        let hub = RelayHub::new();
        let (handle, task) = SessionActor::start(
            params(&hub, "host", true, StaticMediaSource::available(MediaFlags::all())),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(handle.local_id().as_str(), "host");
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.local.is_host);
        assert!(snapshot.local.is_local);
        assert!(snapshot.participants.is_empty());

        handle.cancel();
        task.await.unwrap();
        assert!(handle.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_capture_failure_degrades_media() {
        let hub = RelayHub::new();
        let (handle, _task) = SessionActor::start(
            params(&hub, "guest", false, StaticMediaSource::unavailable("no camera")),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.local.media, MediaFlags::none());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_guest_admin_is_denied() {
        let hub = RelayHub::new();
        let (handle, _task) = SessionActor::start(
            params(&hub, "guest", false, StaticMediaSource::available(MediaFlags::all())),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let err = handle.mute(ParticipantId::from("host")).await.unwrap_err();
        assert!(matches!(err, SessionError::PermissionDenied(_)));
        handle.cancel();
    }

    #[tokio::test]
    async fn test_leave_ends_session() {
        let hub = RelayHub::new();
        let (handle, task) = SessionActor::start(
            params(&hub, "host", true, StaticMediaSource::available(MediaFlags::all())),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let mut events = handle.subscribe();

        handle.leave().await.unwrap();
        task.await.unwrap();

        let mut saw_ended = false;
        while let Ok(event) = events.try_recv() {
            saw_ended |= event == SessionEvent::Ended;
        }
        assert!(saw_ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_emits_local_metrics() {
        let hub = RelayHub::new();
        let (handle, _task) = SessionActor::start(
            params(&hub, "solo", false, StaticMediaSource::available(MediaFlags::all())),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let mut events = handle.subscribe();

        tokio::time::sleep(std::time::Duration::from_millis(3500)).await;

        let mut metric_ticks = 0;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Metrics { participant, .. } = event {
                assert_eq!(participant.as_str(), "solo");
                metric_ticks += 1;
            }
        }
        assert_eq!(metric_ticks, 3);
        assert_eq!(handle.snapshot().await.unwrap().tick, 3);

        let insights = handle.insights(ParticipantId::from("solo")).await.unwrap();
        assert!(insights.is_some());
        handle.cancel();
    }
}
