//! Relay wrapper that loses messages on request.

use async_trait::async_trait;
use common::types::RoomCode;
use session_controller::errors::SessionError;
use session_controller::relay::{RelayLink, SignalRelay};
use session_controller::signaling::SignalMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Wraps a relay and silently drops chosen publications.
///
/// Drop budgets are shared by every link attached through this relay, so
/// `drop_first("join", 1)` loses exactly one `join` across all of them.
#[derive(Clone)]
pub struct LossyRelay {
    inner: Arc<dyn SignalRelay>,
    budgets: Arc<Mutex<HashMap<&'static str, usize>>>,
    dropped: Arc<AtomicUsize>,
}

impl LossyRelay {
    pub fn new(inner: Arc<dyn SignalRelay>) -> Self {
        Self {
            inner,
            budgets: Arc::new(Mutex::new(HashMap::new())),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Drop the next `count` publications of `kind` (e.g. `"join"`).
    pub fn drop_first(self, kind: &'static str, count: usize) -> Self {
        *self.budgets.lock().unwrap().entry(kind).or_insert(0) += count;
        self
    }

    /// The wrapped relay, for members that should publish reliably.
    pub fn inner(&self) -> Arc<dyn SignalRelay> {
        Arc::clone(&self.inner)
    }

    /// How many publications have been dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalRelay for LossyRelay {
    async fn attach(&self, scope: &RoomCode) -> Result<Box<dyn RelayLink>, SessionError> {
        let inner = self.inner.attach(scope).await?;
        Ok(Box::new(LossyLink {
            inner,
            budgets: Arc::clone(&self.budgets),
            dropped: Arc::clone(&self.dropped),
        }))
    }
}

struct LossyLink {
    inner: Box<dyn RelayLink>,
    budgets: Arc<Mutex<HashMap<&'static str, usize>>>,
    dropped: Arc<AtomicUsize>,
}

#[async_trait]
impl RelayLink for LossyLink {
    async fn publish(&mut self, message: &SignalMessage) -> Result<(), SessionError> {
        let lose = {
            let mut budgets = self.budgets.lock().unwrap();
            match budgets.get_mut(message.kind()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        if lose {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.inner.publish(message).await
    }

    async fn recv(&mut self) -> Option<SignalMessage> {
        self.inner.recv().await
    }
}
