//! Session Simulator
//!
//! Runs a host and N guests in one process over the in-process relay and the
//! loopback transport, logging domain events as they happen and each
//! participant's insights at the end.
//!
//! # Environment
//!
//! - `SIM_PARTICIPANTS`: guests to start (default 3)
//! - `SIM_DURATION_SECS`: how long to run (default 60)
//! - `SIM_ROOM`: room code to use (default `SIMRM`)
//! - `SESSION_*`: session configuration, see `SessionConfig`
//! - `RUST_LOG`, `LOG_FORMAT`: logging

#![warn(clippy::pedantic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::config::{init_tracing, ObservabilityConfig};
use common::types::{ParticipantId, RoomCode};
use session_controller::actors::{SessionActor, SessionEvent, SessionHandle, SessionParams};
use session_controller::cognitive::SimulatedInputs;
use session_controller::config::SessionConfig;
use session_controller::participant::{MediaFlags, PeerIdentity};
use session_controller::probe::probe_room;
use session_controller::relay::{LocalRelay, RelayHub, SignalRelay};
use session_controller::transport::{LoopbackFactory, StaticMediaSource};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "session_controller=info,session_sim=info";
const DEFAULT_PARTICIPANTS: usize = 3;
const DEFAULT_DURATION_SECS: u64 = 60;
const DEFAULT_ROOM: &str = "SIMRM";

/// Simulation settings.
#[derive(Debug, Clone)]
struct SimConfig {
    participants: usize,
    duration: Duration,
    room: RoomCode,
}

impl SimConfig {
    fn from_vars(vars: &HashMap<String, String>) -> Result<Self, String> {
        let participants = match vars.get("SIM_PARTICIPANTS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("SIM_PARTICIPANTS '{raw}' is not a count: {e}"))?,
            None => DEFAULT_PARTICIPANTS,
        };
        let duration_secs = match vars.get("SIM_DURATION_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("SIM_DURATION_SECS '{raw}' is not a number: {e}"))?,
            None => DEFAULT_DURATION_SECS,
        };
        let room = RoomCode::parse(vars.get("SIM_ROOM").map_or(DEFAULT_ROOM, String::as_str))
            .map_err(|e| format!("SIM_ROOM: {e}"))?;

        Ok(Self {
            participants,
            duration: Duration::from_secs(duration_secs),
            room,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let vars: HashMap<String, String> = std::env::vars().collect();

    let observability = ObservabilityConfig::from_vars(&vars, DEFAULT_LOG_FILTER)?;
    init_tracing(&observability)?;

    let sim = SimConfig::from_vars(&vars)?;
    let config = SessionConfig::from_vars(&vars).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        room = %sim.room,
        participants = sim.participants,
        duration_secs = sim.duration.as_secs(),
        tick_ms = config.tick_interval.as_millis(),
        "Starting session simulation"
    );

    let hub = RelayHub::new();
    let relay: Arc<dyn SignalRelay> = Arc::new(LocalRelay::new(Arc::clone(&hub)));
    let transports = Arc::new(LoopbackFactory::new());
    let inputs = Arc::new(SimulatedInputs::new(config.simulation_seed));
    let shutdown = CancellationToken::new();

    let start = |name: String, is_host: bool| {
        let params = SessionParams {
            room: sim.room.clone(),
            identity: PeerIdentity {
                id: ParticipantId::new(),
                display_name: name,
                is_host,
                media: MediaFlags::all(),
            },
            config: config.clone(),
            relay: Arc::clone(&relay),
            transports: transports.clone(),
            media: Arc::new(StaticMediaSource::available(MediaFlags::all())),
            inputs: inputs.clone(),
        };
        SessionActor::start(params, shutdown.child_token())
    };

    let (host, host_task) = start("Host".to_string(), true).await?;
    let logger = tokio::spawn(log_events(host.clone()));
    let mut sessions: Vec<(SessionHandle, _)> = Vec::new();

    for n in 1..=sim.participants {
        let prober = ParticipantId::new();
        if let Err(e) = probe_room(relay.as_ref(), &sim.room, &prober, &config).await {
            warn!(guest = n, error = %e, "Room probe failed, guest not started");
            continue;
        }
        let (guest, task) = start(format!("Guest {n}"), false).await?;
        info!(guest = n, id = %guest.local_id(), "Guest joined");
        sessions.push((guest, task));
    }

    tokio::select! {
        () = tokio::time::sleep(sim.duration) => {
            info!("Simulation time elapsed");
        }
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Interrupted");
        }
    }

    report_insights(&host).await;

    for (guest, task) in sessions {
        if guest.leave().await.is_err() {
            // Already stopped, usually evicted
            info!(id = %guest.local_id(), "Guest session had already ended");
        }
        let _ = task.await;
    }
    let _ = host.leave().await;
    shutdown.cancel();
    let _ = host_task.await;
    let _ = logger.await;

    info!(rooms = hub.room_count(), "Simulation complete");
    Ok(())
}

/// Log the host's view of the room until the session ends.
async fn log_events(host: SessionHandle) {
    let mut events = host.subscribe();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Ended) | Err(RecvError::Closed) => break,
            Ok(SessionEvent::Metrics { .. }) => {}
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!(target: "session_sim", event = %json, "Session event"),
                Err(e) => warn!(target: "session_sim", error = %e, "Unserializable event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "session_sim", skipped, "Event log lagged");
            }
        }
    }
}

async fn report_insights(host: &SessionHandle) {
    let Ok(snapshot) = host.snapshot().await else {
        return;
    };
    let members = std::iter::once(&snapshot.local).chain(snapshot.participants.iter());
    for participant in members {
        match host.insights(participant.id.clone()).await {
            Ok(Some(insights)) => info!(
                target: "session_sim",
                participant = %participant.display_name,
                status = ?participant.status,
                attention = insights.average_attention,
                stress = insights.average_stress,
                curiosity = insights.average_curiosity,
                summary = %insights.summary,
                "Session insights"
            ),
            Ok(None) => info!(
                target: "session_sim",
                participant = %participant.display_name,
                status = ?participant.status,
                "No samples recorded"
            ),
            Err(e) => warn!(target: "session_sim", error = %e, "Insights unavailable"),
        }
    }
}
