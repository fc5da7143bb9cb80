//! Request pacing shared by every caller of the upstream host
//!
//! The pacer reserves a start slot for each outbound request under a lock and
//! only then sleeps until that slot. The reservation moves the "last request"
//! marker before any caller suspends, so callers waiting at the same time
//! each get their own slot `min_delay` apart instead of all waking together.

use crate::constants::MIN_REQUEST_DELAY_MS;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Enforces a minimum spacing between outbound request starts
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Creates a pacer with the given minimum spacing
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Waits until the caller may issue its request
    ///
    /// Returns the instant the request is allowed to start.
    pub async fn acquire(&self) -> Instant {
        let slot = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let slot = match *last {
                Some(prev) => (prev + self.min_delay).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Pacing outbound request");
            sleep_until(slot).await;
        }

        slot
    }

    /// Start time of the most recently reserved request
    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(Duration::from_millis(MIN_REQUEST_DELAY_MS))
    }
}
