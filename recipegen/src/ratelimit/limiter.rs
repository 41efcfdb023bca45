//! Token buckets keyed by source identity, with idle-entry sweeping.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cancellation::CancellationToken;

use super::bucket::{Quota, TokenBucket};

/// A gate that admits or refuses one request for a key.
///
/// Implemented by [`KeyedRateLimiter`]; tests substitute a fixed answer.
pub trait RateLimiter: Send + Sync {
    /// Returns true if the request for `key` is admitted.
    fn check(&self, key: &str) -> bool;
}

struct LimiterEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// A map from key to token bucket.
///
/// Entries are created on first use and removed by [`KeyedRateLimiter::sweep`]
/// once idle longer than the expiration window.
pub struct KeyedRateLimiter {
    name: &'static str,
    entries: DashMap<String, LimiterEntry>,
    quota: Quota,
    idle_expiration: Duration,
}

impl std::fmt::Debug for KeyedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedRateLimiter")
            .field("name", &self.name)
            .field("quota", &self.quota)
            .field("idle_expiration", &self.idle_expiration)
            .field("keys", &self.entries.len())
            .finish()
    }
}

impl KeyedRateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(name: &'static str, quota: Quota, idle_expiration: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            quota,
            idle_expiration,
        }
    }

    /// Returns the limiter's name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes entries idle for longer than the expiration window.
    ///
    /// Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= self.idle_expiration);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(limiter = self.name, removed, remaining = self.entries.len(), "Swept idle limiter entries");
        }
        removed
    }

    /// Spawns a task that sweeps every `interval` until `token` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, token: Arc<CancellationToken>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        limiter.sweep();
                    }
                }
            }
            info!(limiter = limiter.name, "Limiter sweeper stopped");
        })
    }
}

impl RateLimiter for KeyedRateLimiter {
    fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        // Lookup first so steady-state traffic does not allocate the key.
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.last_seen = now;
            return entry.bucket.try_acquire_at(now);
        }
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| LimiterEntry {
            bucket: TokenBucket::new_at(self.quota, now),
            last_seen: now,
        });
        entry.last_seen = now;
        entry.bucket.try_acquire_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_second: f64, burst: u32) -> KeyedRateLimiter {
        KeyedRateLimiter::new("test", Quota::new(per_second, burst), Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_plus_one_yields_one_rejection() {
        let limiter = limiter(1.0, 5);
        let rejected = (0..6).filter(|_| !limiter.check("10.0.0.1")).count();
        assert_eq!(rejected, 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = limiter(1.0, 1);
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_idle_entries() {
        let limiter = KeyedRateLimiter::new("test", Quota::new(20.0, 20), Duration::from_secs(60));
        limiter.check("old");
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.check("fresh");
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);
        assert!(limiter.entries.contains_key("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_on_interval_and_stops() {
        let limiter = Arc::new(KeyedRateLimiter::new(
            "test",
            Quota::new(1.0, 1),
            Duration::from_secs(60),
        ));
        let token = Arc::new(CancellationToken::new());
        let handle = limiter.spawn_sweeper(Duration::from_secs(600), token.clone());

        limiter.check("10.0.0.1");
        assert_eq!(limiter.len(), 1);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert!(limiter.is_empty());

        token.cancel("shutdown");
        handle.await.unwrap();
    }
}
