//! Token bucket primitive.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Refill rate and burst capacity for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    /// Tokens added per second.
    pub per_second: f64,
    /// Maximum tokens held; also the initial fill.
    pub burst: u32,
}

impl Quota {
    /// Creates a quota.
    #[must_use]
    pub fn new(per_second: f64, burst: u32) -> Self {
        Self { per_second, burst }
    }
}

/// A bucket that admits bursts up to `burst` and refills continuously.
///
/// Uses tokio's clock so paused-time tests control refill exactly.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    quota: Quota,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(quota: Quota) -> Self {
        Self::new_at(quota, Instant::now())
    }

    /// Creates a full bucket as of `now`.
    #[must_use]
    pub fn new_at(quota: Quota, now: Instant) -> Self {
        Self {
            quota,
            tokens: f64::from(quota.burst),
            last_refill: now,
        }
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Takes one token if available as of `now`.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Returns the tokens available as of `now`.
    #[must_use]
    pub fn available_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.quota.per_second).min(f64::from(self.quota.burst))
    }

    fn refill(&mut self, now: Instant) {
        self.tokens = self.available_at(now);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}
