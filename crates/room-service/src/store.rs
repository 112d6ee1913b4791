//! Expiring key-value store seam for room records.
//!
//! The registry only needs four operations: an atomic insert-if-absent with
//! a TTL, a read, an existence check and a ping. [`RedisRoomStore`] backs
//! them with `SET NX EX`; [`MemoryRoomStore`] keeps everything in-process for
//! development and tests.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ExistenceCheck, SetExpiry, SetOptions};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Expiring key-value store.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Write `value` under `key` only if the key is absent, expiring after
    /// `ttl`. Returns `false` when the key already exists.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Whether a live value exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Connectivity check for readiness.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis-backed room store.
///
/// Uses a multiplexed connection; cloning it per operation is cheap and
/// lets concurrent requests share one socket.
#[derive(Clone)]
pub struct RedisRoomStore {
    connection: MultiplexedConnection,
}

impl RedisRoomStore {
    /// Connect to Redis.
    ///
    /// The URL can embed credentials, so it is never logged.
    #[instrument(skip_all)]
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "room.store", error = %e, "Failed to open Redis client");
            StoreError::Connection(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client.get_multiplexed_async_connection().await.map_err(|e| {
            error!(target: "room.store", error = %e, "Failed to connect to Redis");
            StoreError::Connection(format!("Failed to connect to Redis: {e}"))
        })?;

        debug!(target: "room.store", "Connected to Redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(ttl.as_secs().max(1)));

        // SET NX replies nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg(options)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("SET failed: {e}")))?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("GET failed: {e}")))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("EXISTS failed: {e}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("PING failed: {e}")))?;
        Ok(())
    }
}

/// In-process room store with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_if_absent_refuses_live_key() {
        let store = MemoryRoomStore::new();
        assert!(store
            .put_if_absent("room:AAAAA", "first", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .put_if_absent("room:AAAAA", "second", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(
            store.get("room:AAAAA").await.unwrap().as_deref(),
            Some("first")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let store = MemoryRoomStore::new();
        store
            .put_if_absent("room:BBBBB", "v", Duration::from_secs(3600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(store.exists("room:BBBBB").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("room:BBBBB").await.unwrap());
        assert!(store.is_empty().await);

        // An expired key can be claimed again
        assert!(store
            .put_if_absent("room:BBBBB", "again", Duration::from_secs(10))
            .await
            .unwrap());
    }
}
