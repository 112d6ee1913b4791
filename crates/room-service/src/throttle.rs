//! Per-origin join throttle.
//!
//! A fixed window per origin: the first attempt opens a window with a count
//! of one; inside the window attempts are allowed until the count reaches
//! the limit, and denied attempts are not counted. Once the window has
//! elapsed the next attempt starts a new one.
//!
//! Windows live in process memory. A background sweep prunes windows that
//! have elapsed so idle origins do not accumulate.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window attempt counter keyed by client address.
#[derive(Debug)]
pub struct JoinThrottle {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl JoinThrottle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count an attempt from `origin`.
    ///
    /// Returns `Err(retry_after)` when the origin is over its limit.
    pub fn check(&self, origin: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned map only ever loses counts; let the attempt through
            warn!(target: "room.throttle", "Throttle state poisoned, allowing attempt");
            return Ok(());
        };

        let entry = windows.entry(origin).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed > self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        } else if entry.count >= self.limit {
            let retry_after = self.window.saturating_sub(elapsed);
            debug!(
                target: "room.throttle",
                origin = %origin,
                retry_after_ms = retry_after.as_millis(),
                "Join attempt throttled"
            );
            return Err(retry_after);
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop every window that has fully elapsed. Returns how many were pruned.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            return 0;
        };
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) <= self.window);
        before - windows.len()
    }

    /// Number of origins currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }
}

/// Periodically prune elapsed windows until cancelled.
#[instrument(skip_all, name = "room.task.throttle_sweep")]
pub async fn run_sweeper(throttle: Arc<JoinThrottle>, cancel_token: CancellationToken) {
    info!(
        target: "room.throttle",
        window_secs = throttle.window().as_secs(),
        "Starting join throttle sweep task"
    );

    let mut interval = tokio::time::interval(throttle.window());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let pruned = throttle.sweep();
                if pruned > 0 {
                    debug!(target: "room.throttle", pruned, "Pruned elapsed join windows");
                }
            }
            () = cancel_token.cancelled() => {
                info!(target: "room.throttle", "Join throttle sweep task shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const ORIGIN: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_attempt_in_window_denied() {
        let throttle = JoinThrottle::new(10, Duration::from_secs(60));
        for _ in 0..10 {
            assert!(throttle.check(ORIGIN).is_ok());
        }

        tokio::time::advance(Duration::from_secs(20)).await;
        let retry_after = throttle.check(ORIGIN).unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(40));

        // Other origins are counted separately
        assert!(throttle.check(OTHER).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_attempts_do_not_extend_window() {
        let throttle = JoinThrottle::new(2, Duration::from_secs(60));
        assert!(throttle.check(ORIGIN).is_ok());
        assert!(throttle.check(ORIGIN).is_ok());
        for _ in 0..5 {
            assert!(throttle.check(ORIGIN).is_err());
        }

        // Boundary is inclusive: exactly one window later is still inside it
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(throttle.check(ORIGIN).is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(throttle.check(ORIGIN).is_ok());
        assert!(throttle.check(ORIGIN).is_ok());
        assert!(throttle.check(ORIGIN).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_prunes_elapsed_windows() {
        let throttle = JoinThrottle::new(10, Duration::from_secs(60));
        throttle.check(ORIGIN).unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        throttle.check(OTHER).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(throttle.sweep(), 1);
        assert_eq!(throttle.tracked(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let throttle = Arc::new(JoinThrottle::new(1, Duration::from_secs(60)));
        throttle.check(ORIGIN).unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sweeper(Arc::clone(&throttle), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(throttle.tracked(), 0);

        cancel.cancel();
        task.await.unwrap();
    }
}
