//! Minimum spacing between outbound Gemini requests.
//!
//! The free tier allows 5 requests per minute. Rather than a queue, the
//! throttler keeps the time of the most recent request (its start, raised to
//! its completion once it succeeds) and makes each caller wait until
//! `min_interval` has passed since it. Share one instance
//! (`Arc<Throttler>`) across every pipeline that talks to the same API key.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Spaces outbound requests at least `min_interval` apart.
#[derive(Debug)]
pub struct Throttler {
    min_interval: Duration,
    /// Latest reserved start or recorded completion; `None` until the first.
    last_request: Mutex<Option<Instant>>,
}

impl Throttler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Baseline the next slot is measured from.
    pub fn last_request(&self) -> Option<Instant> {
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the next free request slot, then return.
    ///
    /// Suspends only the calling task. Concurrent callers each receive a
    /// distinct slot at least `min_interval` after the previous one, in no
    /// guaranteed order.
    pub async fn acquire(&self) {
        let slot = self.reserve_slot();
        let now = Instant::now();
        if slot > now {
            let wait = slot - now;
            tracing::info!(
                wait_ms = wait.as_millis() as u64,
                "Throttling: waiting before next Gemini request"
            );
            tokio::time::sleep_until(slot).await;
        }
    }

    /// Compute and record the next slot in one critical section, so two
    /// callers can never read the same baseline.
    fn reserve_slot(&self) -> Instant {
        let now = Instant::now();
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = match *last {
            Some(previous) => (previous + self.min_interval).max(now),
            None => now,
        };
        *last = Some(slot);
        slot
    }

    /// Mark a request as finished now. The baseline only moves forward, so a
    /// slot already reserved by another caller is never pulled earlier.
    pub fn record_completion(&self) {
        let now = Instant::now();
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = Some(last.map_or(now, |previous| previous.max(now)));
    }
}
