//! Room store with scripted conflicts and failures.

use async_trait::async_trait;
use room_service::store::{MemoryRoomStore, RoomStore, StoreError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory store whose writes can be made to conflict or fail.
#[derive(Default, Clone)]
pub struct ScriptedRoomStore {
    inner: Arc<MemoryRoomStore>,
    forced_conflicts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    put_keys: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the next `count` writes as conflicts without storing them.
    pub fn force_conflicts(&self, count: usize) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make every operation, including ping, fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Keys passed to `put_if_absent`, in order, including conflicting ones.
    pub fn put_keys(&self) -> Vec<String> {
        self.put_keys.lock().unwrap().clone()
    }

    fn check_failing(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("scripted store failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoomStore for ScriptedRoomStore {
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_failing()?;
        self.put_keys.lock().unwrap().push(key.to_string());

        let conflict = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Ok(false);
        }
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_failing()?;
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_failing()?;
        self.inner.exists(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_failing()
    }
}
