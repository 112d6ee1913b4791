//! Polling helpers for asynchronous assertions.

use session_controller::actors::SessionEvent;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll `check` until it returns true or `timeout` elapses.
///
/// Returns whether the condition was met.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Next event matching `matches`, skipping others, or `None` on timeout or
/// once the session has stopped publishing.
pub async fn next_event<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    timeout: Duration,
    mut matches: F,
) -> Option<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let search = async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return Some(event),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(timeout, search).await.ok().flatten()
}
