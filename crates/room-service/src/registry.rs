//! Room code allocation and lookup.
//!
//! A room exists only as a record in the expiring store under `room:{CODE}`.
//! Creation draws a random code and claims it with an insert-if-absent
//! write; a collision means another live room holds the code, so a fresh
//! code is drawn. Nothing ever deletes a room: it stops resolving when its
//! TTL lapses.

use crate::errors::RoomError;
use crate::observability::metrics;
use crate::store::{RoomStore, StoreError};
use chrono::Utc;
use common::types::{RoomCode, ROOM_CODE_ALPHABET, ROOM_CODE_LENGTH};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Client message when creation gives up after repeated collisions.
pub const CODE_EXHAUSTED_MESSAGE: &str = "Failed to generate unique room code. Please try again.";

/// Client message for an unknown or expired code.
pub const ROOM_NOT_FOUND_MESSAGE: &str = "Room not found or expired";

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are discarded so every symbol is equally likely.
const REJECTION_BOUND: u8 = 252;

/// Stored room record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub host_id: String,

    /// Unix milliseconds.
    pub created_at: i64,

    #[serde(default)]
    pub meta: serde_json::Value,

    /// Always empty at creation; membership lives on the relay.
    #[serde(default)]
    pub participants: Vec<serde_json::Value>,
}

/// Outcome of a successful creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRoom {
    pub code: RoomCode,
    pub expires_in: Duration,
}

/// Source of candidate room codes.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> Result<RoomCode, RoomError>;
}

/// Uniform codes from the system CSPRNG.
#[derive(Debug)]
pub struct RingCodeSource {
    rng: SystemRandom,
}

impl RingCodeSource {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for RingCodeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeSource for RingCodeSource {
    fn next_code(&self) -> Result<RoomCode, RoomError> {
        let mut code = String::with_capacity(ROOM_CODE_LENGTH);
        let mut bytes = [0u8; 16];

        while code.len() < ROOM_CODE_LENGTH {
            self.rng.fill(&mut bytes).map_err(|_| {
                error!(target: "room.registry", "Failed to generate random bytes");
                RoomError::Internal("random source failure".to_string())
            })?;

            for byte in bytes {
                if byte >= REJECTION_BOUND {
                    continue;
                }
                let symbol = ROOM_CODE_ALPHABET
                    .get(usize::from(byte) % ROOM_CODE_ALPHABET.len())
                    .copied()
                    .unwrap_or(b'A');
                code.push(char::from(symbol));
                if code.len() == ROOM_CODE_LENGTH {
                    break;
                }
            }
        }

        RoomCode::parse(&code).map_err(|e| RoomError::Internal(e.to_string()))
    }
}

/// Allocates and resolves room codes against a [`RoomStore`].
#[derive(Clone)]
pub struct RoomRegistry {
    store: Arc<dyn RoomStore>,
    codes: Arc<dyn CodeSource>,
    ttl: Duration,
    max_attempts: u32,
}

impl RoomRegistry {
    pub fn new(
        store: Arc<dyn RoomStore>,
        codes: Arc<dyn CodeSource>,
        ttl: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            codes,
            ttl,
            max_attempts,
        }
    }

    /// Registry drawing codes from the system CSPRNG.
    pub fn with_ring(store: Arc<dyn RoomStore>, ttl: Duration, max_attempts: u32) -> Self {
        Self::new(store, Arc::new(RingCodeSource::new()), ttl, max_attempts)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a room for `host_id`.
    ///
    /// # Errors
    ///
    /// - `Unavailable` if every code drawn collided with a live room
    /// - `Store` if the store could not be reached
    #[instrument(skip_all, fields(host_id = %host_id))]
    pub async fn create_room(
        &self,
        host_id: &str,
        meta: serde_json::Value,
    ) -> Result<CreatedRoom, RoomError> {
        let record = RoomRecord {
            host_id: host_id.to_string(),
            created_at: Utc::now().timestamp_millis(),
            meta,
            participants: Vec::new(),
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| RoomError::Internal(format!("room record serialization: {e}")))?;

        for attempt in 1..=self.max_attempts {
            let code = self.codes.next_code()?;
            let key = room_key(&code);

            let claimed = timed("put_if_absent", self.store.put_if_absent(&key, &value, self.ttl))
                .await
                .inspect_err(|_| metrics::record_room_created("error"))?;

            if claimed {
                info!(target: "room.registry", room = %code, attempt, "Room created");
                metrics::record_room_created("success");
                return Ok(CreatedRoom {
                    code,
                    expires_in: self.ttl,
                });
            }

            metrics::record_code_collision();
            debug!(target: "room.registry", room = %code, attempt, "Room code collision, retrying");
        }

        warn!(
            target: "room.registry",
            attempts = self.max_attempts,
            "Room code space exhausted"
        );
        metrics::record_room_created("unavailable");
        Err(RoomError::Unavailable(CODE_EXHAUSTED_MESSAGE.to_string()))
    }

    /// Resolve a live room.
    ///
    /// An expired room is indistinguishable from one that never existed.
    #[instrument(skip_all, fields(room = %code))]
    pub async fn lookup_room(&self, code: &RoomCode) -> Result<RoomRecord, RoomError> {
        let raw = timed("get", self.store.get(&room_key(code))).await?;
        let Some(raw) = raw else {
            return Err(RoomError::NotFound(ROOM_NOT_FOUND_MESSAGE.to_string()));
        };

        serde_json::from_str(&raw).map_err(|e| {
            RoomError::Internal(format!("stored record for {code} is unreadable: {e}"))
        })
    }

    /// Whether `code` currently resolves.
    pub async fn exists(&self, code: &RoomCode) -> Result<bool, RoomError> {
        Ok(timed("exists", self.store.exists(&room_key(code))).await?)
    }

    /// Store connectivity check.
    pub async fn ping(&self) -> Result<(), StoreError> {
        timed("ping", self.store.ping()).await
    }
}

/// Store key for a room.
pub fn room_key(code: &RoomCode) -> String {
    format!("room:{code}")
}

async fn timed<T>(
    operation: &'static str,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    let start = Instant::now();
    let result = fut.await;
    metrics::record_store_duration(operation, start.elapsed());
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryRoomStore;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    /// Replays a fixed list of codes.
    struct FixedCodes(Mutex<VecDeque<&'static str>>);

    impl FixedCodes {
        fn new(codes: &[&'static str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(codes.iter().copied().collect())))
        }
    }

    impl CodeSource for FixedCodes {
        fn next_code(&self) -> Result<RoomCode, RoomError> {
            let code = self.0.lock().unwrap().pop_front().expect("codes exhausted");
            Ok(RoomCode::parse(code).unwrap())
        }
    }

    fn registry(codes: Arc<dyn CodeSource>) -> (RoomRegistry, Arc<MemoryRoomStore>) {
        let store = Arc::new(MemoryRoomStore::new());
        let registry = RoomRegistry::new(store.clone(), codes, Duration::from_secs(3600), 10);
        (registry, store)
    }

    #[test]
    fn test_ring_codes_are_well_formed() {
        let source = RingCodeSource::new();
        for _ in 0..500 {
            let code = source.next_code().unwrap();
            assert_eq!(code.as_str().len(), ROOM_CODE_LENGTH);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_ring_codes_cover_alphabet() {
        let source = RingCodeSource::new();
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            seen.extend(source.next_code().unwrap().as_str().bytes());
        }
        assert_eq!(seen.len(), ROOM_CODE_ALPHABET.len());
    }

    #[tokio::test]
    async fn test_create_then_lookup() {
        let (registry, _) = registry(FixedCodes::new(&["ABCDE"]));
        let created = registry
            .create_room("host-1", serde_json::json!({"topic": "standup"}))
            .await
            .unwrap();
        assert_eq!(created.code.as_str(), "ABCDE");
        assert_eq!(created.expires_in, Duration::from_secs(3600));

        let lower = RoomCode::parse("abcde").unwrap();
        let record = registry.lookup_room(&lower).await.unwrap();
        assert_eq!(record.host_id, "host-1");
        assert_eq!(record.meta["topic"], "standup");
        assert!(record.participants.is_empty());
    }

    #[tokio::test]
    async fn test_collision_retries_with_new_code() {
        let (registry, store) = registry(FixedCodes::new(&["TAKEN", "FRESH"]));
        store
            .put_if_absent("room:TAKEN", "{}", Duration::from_secs(3600))
            .await
            .unwrap();

        let created = registry
            .create_room("host", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(created.code.as_str(), "FRESH");
    }

    #[tokio::test]
    async fn test_exhausted_attempts_are_unavailable() {
        let store = Arc::new(MemoryRoomStore::new());
        store
            .put_if_absent("room:SAME1", "{}", Duration::from_secs(3600))
            .await
            .unwrap();
        let codes = FixedCodes::new(&["SAME1"; 3]);
        let registry = RoomRegistry::new(store, codes, Duration::from_secs(3600), 3);

        let err = registry
            .create_room("host", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Unavailable(ref m) if m == CODE_EXHAUSTED_MESSAGE));
    }

    #[tokio::test]
    async fn test_unknown_code_not_found() {
        let (registry, _) = registry(FixedCodes::new(&[]));
        let err = registry
            .lookup_room(&RoomCode::parse("NOPE1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::NotFound(ref m) if m == ROOM_NOT_FOUND_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_stops_resolving_after_ttl() {
        let store = Arc::new(MemoryRoomStore::new());
        let registry = RoomRegistry::new(
            store,
            FixedCodes::new(&["TTL01"]),
            Duration::from_secs(3600),
            10,
        );
        let created = registry
            .create_room("host", serde_json::Value::Null)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(1800)).await;
        assert!(registry.lookup_room(&created.code).await.is_ok());
        assert!(registry.exists(&created.code).await.unwrap());

        tokio::time::advance(Duration::from_secs(1801)).await;
        assert!(matches!(
            registry.lookup_room(&created.code).await,
            Err(RoomError::NotFound(_))
        ));
        assert!(!registry.exists(&created.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_ten_thousand_rooms_resolve_uniquely() {
        let store = Arc::new(MemoryRoomStore::new());
        let registry = RoomRegistry::with_ring(store.clone(), Duration::from_secs(3600), 10);

        let mut codes = HashSet::new();
        for n in 0..10_000 {
            let created = registry
                .create_room(&format!("host-{n}"), serde_json::Value::Null)
                .await
                .unwrap();
            assert!(codes.insert(created.code), "duplicate resolvable code");
        }
        assert_eq!(store.len().await, 10_000);
    }
}
