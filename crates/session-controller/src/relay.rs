//! Room-scoped fan-out relay.
//!
//! [`RelayHub`] is the broadcast substrate: one channel per room code, every
//! payload delivered to every other member of that room, never echoed back
//! to its publisher. It carries opaque strings and keeps nothing once
//! delivered. The room service exposes it over WebSockets; in-process
//! sessions reach it through [`LocalRelay`].
//!
//! Sessions only depend on the [`SignalRelay`] / [`RelayLink`] traits, so the
//! hub can be swapped for a remote relay or wrapped to inject message loss.

use crate::errors::SessionError;
use crate::observability::metrics;
use crate::signaling::SignalMessage;
use async_trait::async_trait;
use common::types::RoomCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Per-room channel capacity. Slower members lose the oldest messages.
pub const RELAY_CHANNEL_CAPACITY: usize = 256;

/// A payload tagged with the member that published it.
#[derive(Debug, Clone)]
pub struct RelayEnvelope {
    origin: u64,
    payload: Arc<str>,
}

/// In-process fan-out hub keyed by room code.
#[derive(Debug, Default)]
pub struct RelayHub {
    rooms: Mutex<HashMap<RoomCode, broadcast::Sender<RelayEnvelope>>>,
    next_origin: AtomicU64,
}

impl RelayHub {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the fan-out for `scope`.
    pub fn attach(self: &Arc<Self>, scope: &RoomCode) -> Result<RelayMember, SessionError> {
        let origin = self.next_origin.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|_| SessionError::Internal("relay hub lock poisoned".to_string()))?;

        let sender = rooms
            .entry(scope.clone())
            .or_insert_with(|| broadcast::channel(RELAY_CHANNEL_CAPACITY).0)
            .clone();
        let receiver = sender.subscribe();

        debug!(
            target: "session.relay",
            room = %scope,
            origin,
            members = sender.receiver_count(),
            "Member attached to relay"
        );

        Ok(RelayMember {
            origin,
            scope: scope.clone(),
            sender,
            receiver,
            hub: Arc::clone(self),
        })
    }

    /// Number of rooms with at least one attached member.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }

    /// Number of members attached to `scope`.
    pub fn member_count(&self, scope: &RoomCode) -> usize {
        self.rooms
            .lock()
            .ok()
            .and_then(|rooms| rooms.get(scope).map(broadcast::Sender::receiver_count))
            .unwrap_or(0)
    }

    fn release(&self, scope: &RoomCode) {
        let Ok(mut rooms) = self.rooms.lock() else {
            return;
        };
        // The departing member's receiver is still alive at this point.
        let empty = rooms
            .get(scope)
            .is_some_and(|sender| sender.receiver_count() <= 1);
        if empty {
            rooms.remove(scope);
            debug!(target: "session.relay", room = %scope, "Relay room released");
        }
    }
}

/// One member's attachment to a room on the hub.
#[derive(Debug)]
pub struct RelayMember {
    origin: u64,
    scope: RoomCode,
    sender: broadcast::Sender<RelayEnvelope>,
    receiver: broadcast::Receiver<RelayEnvelope>,
    hub: Arc<RelayHub>,
}

impl RelayMember {
    #[must_use]
    pub fn origin(&self) -> u64 {
        self.origin
    }

    #[must_use]
    pub fn scope(&self) -> &RoomCode {
        &self.scope
    }

    /// Fan `payload` out to every other member. Never blocks.
    ///
    /// Returns how many other members were attached at publish time.
    pub fn publish(&self, payload: impl Into<Arc<str>>) -> usize {
        let envelope = RelayEnvelope {
            origin: self.origin,
            payload: payload.into(),
        };
        // Our own receiver keeps the channel open, so send cannot fail.
        let _ = self.sender.send(envelope);
        self.sender.receiver_count().saturating_sub(1)
    }

    /// Next payload published by someone else. `None` once the room closes.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.origin => continue,
                Ok(envelope) => return Some(envelope.payload),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        target: "session.relay",
                        room = %self.scope,
                        origin = self.origin,
                        skipped,
                        "Relay member lagged, messages dropped"
                    );
                    metrics::record_relay_lag(skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for RelayMember {
    fn drop(&mut self) {
        self.hub.release(&self.scope);
    }
}

/// A session's typed connection to one room on a relay.
#[async_trait]
pub trait RelayLink: Send {
    /// Publish to the room. Must not wait for any acknowledgment.
    async fn publish(&mut self, message: &SignalMessage) -> Result<(), SessionError>;

    /// Next decodable message from another member, `None` when detached.
    async fn recv(&mut self) -> Option<SignalMessage>;
}

/// Factory for room-scoped relay links.
#[async_trait]
pub trait SignalRelay: Send + Sync {
    async fn attach(&self, scope: &RoomCode) -> Result<Box<dyn RelayLink>, SessionError>;
}

/// [`SignalRelay`] over an in-process [`RelayHub`].
#[derive(Debug, Clone)]
pub struct LocalRelay {
    hub: Arc<RelayHub>,
}

impl LocalRelay {
    #[must_use]
    pub fn new(hub: Arc<RelayHub>) -> Self {
        Self { hub }
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }
}

#[async_trait]
impl SignalRelay for LocalRelay {
    async fn attach(&self, scope: &RoomCode) -> Result<Box<dyn RelayLink>, SessionError> {
        let member = self.hub.attach(scope)?;
        Ok(Box::new(LocalRelayLink { member }))
    }
}

struct LocalRelayLink {
    member: RelayMember,
}

#[async_trait]
impl RelayLink for LocalRelayLink {
    async fn publish(&mut self, message: &SignalMessage) -> Result<(), SessionError> {
        let payload = message.encode()?;
        self.member.publish(payload);
        Ok(())
    }

    async fn recv(&mut self) -> Option<SignalMessage> {
        loop {
            let payload = self.member.recv().await?;
            match SignalMessage::decode(&payload) {
                Ok(message) => return Some(message),
                Err(e) => {
                    warn!(
                        target: "session.relay",
                        room = %self.member.scope(),
                        error = %e,
                        "Dropping malformed relay payload"
                    );
                    metrics::record_signal("unknown", "malformed");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::ParticipantId;
    use std::time::Duration;

    fn room(code: &str) -> RoomCode {
        RoomCode::parse(code).unwrap()
    }

    #[tokio::test]
    async fn test_publish_reaches_others_not_self() {
        let hub = RelayHub::new();
        let a = hub.attach(&room("AAAAA")).unwrap();
        let mut b = hub.attach(&room("AAAAA")).unwrap();
        let mut c = hub.attach(&room("AAAAA")).unwrap();

        assert_eq!(a.publish("hello"), 2);
        assert_eq!(&*b.recv().await.unwrap(), "hello");
        assert_eq!(&*c.recv().await.unwrap(), "hello");

        let mut a = a;
        let nothing = tokio::time::timeout(Duration::from_millis(50), a.recv()).await;
        assert!(nothing.is_err(), "publisher must not receive its own message");
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = RelayHub::new();
        let a = hub.attach(&room("AAAAA")).unwrap();
        let mut other = hub.attach(&room("BBBBB")).unwrap();

        assert_eq!(a.publish("only for AAAAA"), 0);
        let nothing = tokio::time::timeout(Duration::from_millis(50), other.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_room_released_when_last_member_leaves() {
        let hub = RelayHub::new();
        let a = hub.attach(&room("AAAAA")).unwrap();
        let b = hub.attach(&room("AAAAA")).unwrap();
        assert_eq!(hub.room_count(), 1);
        assert_eq!(hub.member_count(&room("AAAAA")), 2);

        drop(a);
        assert_eq!(hub.room_count(), 1);
        drop(b);
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn test_local_relay_skips_malformed_payloads() {
        let hub = RelayHub::new();
        let relay = LocalRelay::new(Arc::clone(&hub));
        let raw = hub.attach(&room("CCCCC")).unwrap();
        let mut link = relay.attach(&room("ccccc")).await.unwrap();

        raw.publish("{\"type\":\"bogus\"}");
        let leave = SignalMessage::Leave {
            sender: ParticipantId::from("x"),
        };
        raw.publish(leave.encode().unwrap());

        assert_eq!(link.recv().await.unwrap(), leave);
    }
}
