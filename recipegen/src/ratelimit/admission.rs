//! Inbound admission: per-address and shared-credential gates.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::cancellation::CancellationToken;
use crate::config::RateLimitSettings;
use crate::errors::AdmissionError;

use super::bucket::Quota;
use super::limiter::{KeyedRateLimiter, RateLimiter};

/// The single key every shared-credential request is counted against.
pub const SHARED_CREDENTIAL_KEY: &str = "shared-credential";

/// The two independent gates an inbound request passes.
#[derive(Clone)]
pub struct AdmissionGate {
    per_address: Arc<dyn RateLimiter>,
    shared_credential: Arc<dyn RateLimiter>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate").finish_non_exhaustive()
    }
}

impl AdmissionGate {
    /// Creates a gate over two limiters.
    #[must_use]
    pub fn new(per_address: Arc<dyn RateLimiter>, shared_credential: Arc<dyn RateLimiter>) -> Self {
        Self {
            per_address,
            shared_credential,
        }
    }

    /// Checks the caller's source address.
    pub fn admit_address(&self, source: IpAddr) -> Result<(), AdmissionError> {
        let key = source.to_string();
        if self.per_address.check(&key) {
            Ok(())
        } else {
            warn!(source = %key, "Request throttled by address limiter");
            Err(AdmissionError::AddressThrottled(key))
        }
    }

    /// Checks the shared-credential bucket.
    pub fn admit_shared(&self) -> Result<(), AdmissionError> {
        if self.shared_credential.check(SHARED_CREDENTIAL_KEY) {
            Ok(())
        } else {
            warn!("Request throttled by shared credential limiter");
            Err(AdmissionError::SharedCredentialSaturated)
        }
    }
}

/// Keyed limiters built from configuration, plus their sweepers.
#[derive(Debug, Clone)]
pub struct Limiters {
    /// Per-source-address limiter.
    pub per_address: Arc<KeyedRateLimiter>,
    /// Shared-credential limiter.
    pub shared_credential: Arc<KeyedRateLimiter>,
    sweep_interval: Duration,
}

impl Limiters {
    /// Builds both limiters from settings.
    #[must_use]
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let idle = settings.idle_expiration();
        Self {
            per_address: Arc::new(KeyedRateLimiter::new(
                "per_address",
                Quota::new(settings.per_address.per_second, settings.per_address.burst),
                idle,
            )),
            shared_credential: Arc::new(KeyedRateLimiter::new(
                "shared_credential",
                Quota::new(
                    settings.shared_credential.per_second,
                    settings.shared_credential.burst,
                ),
                idle,
            )),
            sweep_interval: settings.sweep_interval(),
        }
    }

    /// Returns a gate over these limiters.
    #[must_use]
    pub fn gate(&self) -> AdmissionGate {
        AdmissionGate::new(self.per_address.clone(), self.shared_credential.clone())
    }

    /// Starts both background sweepers; they stop when `token` is cancelled.
    pub fn spawn_sweepers(&self, token: &Arc<CancellationToken>) -> Vec<JoinHandle<()>> {
        vec![
            self.per_address.spawn_sweeper(self.sweep_interval, Arc::clone(token)),
            self.shared_credential.spawn_sweeper(self.sweep_interval, Arc::clone(token)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QuotaSettings, RateLimitSettings};
    use crate::testing::FixedRateLimiter;
    use std::net::Ipv4Addr;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_distinct_signals() {
        let gate = AdmissionGate::new(
            Arc::new(FixedRateLimiter::deny()),
            Arc::new(FixedRateLimiter::deny()),
        );
        assert_eq!(
            gate.admit_address(addr(1)),
            Err(AdmissionError::AddressThrottled("10.0.0.1".into()))
        );
        assert_eq!(gate.admit_shared(), Err(AdmissionError::SharedCredentialSaturated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_bucket_is_global() {
        let settings = RateLimitSettings {
            shared_credential: QuotaSettings {
                per_second: 1.0,
                burst: 2,
            },
            ..RateLimitSettings::default()
        };
        let limiters = Limiters::from_settings(&settings);
        let gate = limiters.gate();

        assert!(gate.admit_shared().is_ok());
        assert!(gate.admit_shared().is_ok());
        assert_eq!(gate.admit_shared(), Err(AdmissionError::SharedCredentialSaturated));
        // Address buckets are untouched by shared-credential use.
        assert!(gate.admit_address(addr(1)).is_ok());
        assert_eq!(limiters.shared_credential.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_buckets_per_source() {
        let settings = RateLimitSettings {
            per_address: QuotaSettings {
                per_second: 1.0,
                burst: 1,
            },
            ..RateLimitSettings::default()
        };
        let gate = Limiters::from_settings(&settings).gate();

        assert!(gate.admit_address(addr(1)).is_ok());
        assert!(gate.admit_address(addr(1)).is_err());
        assert!(gate.admit_address(addr(2)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweepers_stop_on_cancel() {
        let limiters = Limiters::from_settings(&RateLimitSettings::default());
        let token = Arc::new(CancellationToken::new());
        let handles = limiters.spawn_sweepers(&token);
        token.cancel("shutdown");
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
