//! Rate limiting for inbound generation requests.
//!
//! This module provides:
//! - TokenBucket, the refilling primitive
//! - KeyedRateLimiter, buckets keyed by source with a periodic idle sweep
//! - AdmissionGate, the per-address and shared-credential checks

mod admission;
mod bucket;
mod limiter;

pub use admission::{AdmissionGate, Limiters, SHARED_CREDENTIAL_KEY};
pub use bucket::{Quota, TokenBucket};
pub use limiter::{KeyedRateLimiter, RateLimiter};
