//! Error classification and wait computation.
//!
//! Every upstream failure maps to exactly one [`RetryClass`]. The match in
//! [`RetryClass::classify`] is exhaustive over [`UpstreamErrorKind`], so a new
//! failure shape does not compile until someone decides how to treat it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::{UpstreamError, UpstreamErrorKind};

/// Default fixed backoff for capacity and server faults.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryClass {
    /// Never retried.
    Fatal,
    /// The credential was refused; try the next one immediately.
    CredentialRejected,
    /// The service reported it is rate limiting us; back off.
    Overloaded,
    /// The service failed internally; back off.
    ServerFault,
}

impl RetryClass {
    /// Classifies one failed attempt.
    #[must_use]
    pub fn classify(error: &UpstreamError) -> Self {
        match error.kind {
            UpstreamErrorKind::Status(401) => Self::CredentialRejected,
            UpstreamErrorKind::Status(429) => Self::Overloaded,
            UpstreamErrorKind::Status(code) if (500..=599).contains(&code) => Self::ServerFault,
            UpstreamErrorKind::Status(_)
            | UpstreamErrorKind::Network
            | UpstreamErrorKind::MalformedResponse
            | UpstreamErrorKind::EmptyResult => Self::Fatal,
        }
    }

    /// Returns the snake_case label used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::CredentialRejected => "credential_rejected",
            Self::Overloaded => "overloaded",
            Self::ServerFault => "server_fault",
        }
    }
}

impl fmt::Display for RetryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Jitter applied on top of the scaled backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Exact waits.
    #[default]
    None,
    /// Half fixed, half random.
    Equal,
}

/// What the retrying client should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDirective {
    /// Whether another attempt is worthwhile.
    pub retry: bool,
    /// Whether to move the credential pool before retrying.
    pub rotate_credential: bool,
    /// Base wait before the next attempt.
    pub wait: Duration,
}

impl RetryDirective {
    /// Give up now.
    pub const FATAL: Self = Self {
        retry: false,
        rotate_credential: false,
        wait: Duration::ZERO,
    };
}

/// Maps failures to directives and scales waits by attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Duration,
    jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given fixed backoff.
    #[must_use]
    pub fn new(backoff: Duration) -> Self {
        Self {
            backoff,
            jitter: JitterStrategy::None,
        }
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the fixed backoff.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Decides how to handle one failed attempt.
    #[must_use]
    pub fn decide(&self, error: &UpstreamError) -> RetryDirective {
        match RetryClass::classify(error) {
            RetryClass::Fatal => RetryDirective::FATAL,
            RetryClass::CredentialRejected => RetryDirective {
                retry: true,
                rotate_credential: true,
                wait: Duration::ZERO,
            },
            RetryClass::Overloaded | RetryClass::ServerFault => RetryDirective {
                retry: true,
                rotate_credential: false,
                wait: self.backoff,
            },
        }
    }

    /// Scales a base wait by the 1-based attempt that just failed.
    #[must_use]
    pub fn scaled_wait(&self, base: Duration, attempt: u32) -> Duration {
        let scaled = base.saturating_mul(attempt.max(1));
        match self.jitter {
            JitterStrategy::None => scaled,
            JitterStrategy::Equal => {
                let millis = u64::try_from(scaled.as_millis()).unwrap_or(u64::MAX);
                let half = millis / 2;
                if half == 0 {
                    scaled
                } else {
                    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
                }
            }
        }
    }
}
