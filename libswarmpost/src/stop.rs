//! Cooperative run/stop signaling
//!
//! One shared flag controls every worker and background task. There is no
//! hard kill: tasks observe the flag at sleep-check boundaries, so a stop
//! request is honored within about a second even mid multi-minute wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

/// Shared, clonable run flag
#[derive(Clone)]
pub struct StopFlag {
    running: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Re-arm the flag for a new run.
    pub fn reset(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    /// Sleep for `duration`, checking the flag at most every second.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the wait was
    /// cut short by a stop request.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        let step = Duration::from_secs(1);

        while remaining > Duration::ZERO {
            if !self.is_running() {
                return false;
            }
            let slice = remaining.min(step);
            sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }

        self.is_running()
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}
