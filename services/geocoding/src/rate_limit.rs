//! Outbound request rate limiting
//!
//! Spaces provider calls at least `1 / rps` apart across every task in the
//! process. Waiters are served in arrival order: the slot schedule sits
//! behind a fair `tokio::sync::Mutex`, and each caller reserves its grant
//! time before releasing the lock and sleeping until it.

use crate::clock::{deadline_after, FAR_FUTURE};
use crate::error::LookupError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Process-wide limiter for calls to one provider
#[derive(Debug)]
pub struct RateLimiter {
    rps: f64,
    interval: Duration,
    /// Earliest instant the next slot may be granted
    next_slot: Mutex<Instant>,
    granted: AtomicU64,
    timeouts: AtomicU64,
}

impl RateLimiter {
    /// Limit to `rps` calls per second; `rps <= 0` disables limiting.
    /// Rates too small to space on the clock grant one call and then
    /// effectively none.
    pub fn new(rps: f64) -> Self {
        let interval = if rps > 0.0 && rps.is_finite() {
            Duration::try_from_secs_f64(1.0 / rps)
                .unwrap_or(FAR_FUTURE)
                .min(FAR_FUTURE)
        } else {
            Duration::ZERO
        };

        Self {
            rps,
            interval,
            next_slot: Mutex::new(Instant::now()),
            granted: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.interval.is_zero()
    }

    /// Configured calls per second
    pub fn rps(&self) -> f64 {
        self.rps
    }

    /// Minimum spacing between two grants
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Slots handed out so far
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    /// Callers that gave up waiting
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Wait for the next call slot, giving up after `timeout`.
    ///
    /// Returns the instant the slot was granted. A caller that cannot be
    /// served within its timeout fails without consuming a slot, so it never
    /// delays the callers queued behind it.
    pub async fn acquire_slot(&self, timeout: Duration) -> Result<Instant, LookupError> {
        let started = Instant::now();
        if self.is_unlimited() {
            self.granted.fetch_add(1, Ordering::Relaxed);
            return Ok(started);
        }

        let deadline = deadline_after(started, timeout);
        let mut next_slot = match tokio::time::timeout_at(deadline, self.next_slot.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Err(self.timed_out(started)),
        };

        let grant_at = (*next_slot).max(Instant::now());
        if grant_at > deadline {
            drop(next_slot);
            return Err(self.timed_out(started));
        }

        *next_slot = deadline_after(grant_at, self.interval);
        drop(next_slot);

        tokio::time::sleep_until(grant_at).await;
        self.granted.fetch_add(1, Ordering::Relaxed);
        trace!(waited = ?grant_at.saturating_duration_since(started), "Rate slot granted");
        Ok(grant_at)
    }

    fn timed_out(&self, started: Instant) -> LookupError {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        let waited = started.elapsed();
        debug!(?waited, rps = self.rps, "No rate slot within budget");
        LookupError::RateLimitTimeout { waited }
    }
}
