//! Join-validation probe.
//!
//! Before committing to a room a member can ask whether anyone is there: it
//! publishes `probe{nonce}` until some member answers with a matching
//! `probe-ack`. Silence until the timeout means the room does not exist.

use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::relay::SignalRelay;
use crate::signaling::SignalMessage;
use common::types::{ParticipantId, RoomCode};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Probe `room` through `relay`.
///
/// # Errors
///
/// - `NotFound` if no member answers within `config.probe_timeout`
/// - `Relay` if the relay cannot be reached
#[instrument(skip_all, name = "session.probe", fields(room = %room))]
pub async fn probe_room(
    relay: &dyn SignalRelay,
    room: &RoomCode,
    prober: &ParticipantId,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    let mut link = relay.attach(room).await?;
    let nonce = Uuid::new_v4().simple().to_string();
    let probe = SignalMessage::Probe {
        sender: prober.clone(),
        nonce: nonce.clone(),
    };

    let deadline = Instant::now() + config.probe_timeout;
    let mut resend = interval(config.probe_interval);
    resend.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts: u32 = 0;

    loop {
        tokio::select! {
            () = sleep_until(deadline) => {
                info!(
                    target: "session.probe",
                    room = %room,
                    attempts,
                    "No member answered, room not found"
                );
                return Err(SessionError::NotFound(room.to_string()));
            }

            _ = resend.tick() => {
                attempts += 1;
                link.publish(&probe).await?;
            }

            message = link.recv() => {
                match message {
                    Some(SignalMessage::ProbeAck { sender, target, nonce: acked })
                        if target == *prober && acked == nonce =>
                    {
                        debug!(
                            target: "session.probe",
                            room = %room,
                            member = %sender,
                            attempts,
                            "Probe acknowledged"
                        );
                        return Ok(());
                    }
                    Some(_) => {}
                    None => {
                        return Err(SessionError::Relay("relay detached during probe".to_string()));
                    }
                }
            }
        }
    }
}
