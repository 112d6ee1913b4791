//! Participant fixtures.

use crate::inputs::ConstantInputs;
use common::types::{ParticipantId, RoomCode};
use session_controller::actors::{SessionActor, SessionHandle, SessionParams};
use session_controller::cognitive::InputSourceFactory;
use session_controller::config::SessionConfig;
use session_controller::participant::{MediaFlags, PeerIdentity};
use session_controller::relay::SignalRelay;
use session_controller::transport::{
    LoopbackFactory, MediaSource, StaticMediaSource, TransportFactory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Parse a room code, panicking on malformed test input.
pub fn room(code: &str) -> RoomCode {
    RoomCode::parse(code).expect("valid test room code")
}

/// Session timings shrunk for tests, with simulated moderation signals off.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        tick_interval: Duration::from_millis(50),
        heartbeat_interval: Duration::from_millis(200),
        join_burst_offsets: vec![
            Duration::ZERO,
            Duration::from_millis(150),
            Duration::from_millis(400),
        ],
        probe_timeout: Duration::from_millis(500),
        probe_interval: Duration::from_millis(50),
        handshake_timeout: Duration::from_millis(300),
        posture_event_probability: 0.0,
        severe_posture_share: 0.0,
        toxicity_probability: 0.0,
        simulation_seed: Some(7),
    }
}

/// Builder for one room member.
///
/// ```rust,ignore
/// let hub = RelayHub::new();
/// let relay: Arc<dyn SignalRelay> = Arc::new(LocalRelay::new(hub));
/// let (host, _task) = TestParticipant::host("Host", relay.clone())
///     .start(&room("ABCDE"))
///     .await;
/// ```
pub struct TestParticipant {
    identity: PeerIdentity,
    config: SessionConfig,
    relay: Arc<dyn SignalRelay>,
    transports: Arc<dyn TransportFactory>,
    media: Arc<dyn MediaSource>,
    inputs: Arc<dyn InputSourceFactory>,
    cancel_token: CancellationToken,
}

impl TestParticipant {
    pub fn host(name: &str, relay: Arc<dyn SignalRelay>) -> Self {
        Self::new(name, true, relay)
    }

    pub fn guest(name: &str, relay: Arc<dyn SignalRelay>) -> Self {
        Self::new(name, false, relay)
    }

    fn new(name: &str, is_host: bool, relay: Arc<dyn SignalRelay>) -> Self {
        Self {
            identity: PeerIdentity {
                id: ParticipantId::new(),
                display_name: name.to_string(),
                is_host,
                media: MediaFlags::all(),
            },
            config: fast_config(),
            relay,
            transports: Arc::new(LoopbackFactory::new()),
            media: Arc::new(StaticMediaSource::available(MediaFlags::all())),
            inputs: Arc::new(ConstantInputs::calm()),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Fix the participant id, e.g. to control glare ordering.
    pub fn with_id(mut self, id: impl Into<ParticipantId>) -> Self {
        self.identity.id = id.into();
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transports(mut self, transports: Arc<dyn TransportFactory>) -> Self {
        self.transports = transports;
        self
    }

    pub fn with_media(mut self, media: Arc<dyn MediaSource>) -> Self {
        self.media = media;
        self
    }

    pub fn with_inputs(mut self, inputs: Arc<dyn InputSourceFactory>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn id(&self) -> &ParticipantId {
        &self.identity.id
    }

    pub fn params(&self, room: &RoomCode) -> SessionParams {
        SessionParams {
            room: room.clone(),
            identity: self.identity.clone(),
            config: self.config.clone(),
            relay: Arc::clone(&self.relay),
            transports: Arc::clone(&self.transports),
            media: Arc::clone(&self.media),
            inputs: Arc::clone(&self.inputs),
        }
    }

    /// Start the session, panicking if the relay cannot be attached.
    pub async fn start(self, room: &RoomCode) -> (SessionHandle, JoinHandle<()>) {
        SessionActor::start(self.params(room), self.cancel_token)
            .await
            .expect("session should start")
    }
}
