//! Bounded retry loop around one external call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancellation::CancellationToken;
use crate::credentials::{Credential, CredentialSource};
use crate::errors::{GenerationError, UpstreamError};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};

use super::policy::{RetryClass, RetryPolicy};

/// A successful call result that may still carry nothing usable.
pub trait CallOutput {
    /// Returns true if the result should be treated as empty.
    fn is_empty_output(&self) -> bool;
}

impl CallOutput for String {
    fn is_empty_output(&self) -> bool {
        self.trim().is_empty()
    }
}

/// Runs one kind of external call with retry, rotation and backoff.
///
/// The same loop serves text and image generation. The only side effect
/// besides the call itself is advancing the credential source after a
/// rejection.
#[derive(Clone)]
pub struct RetryingClient {
    operation: &'static str,
    credentials: Arc<dyn CredentialSource>,
    policy: RetryPolicy,
    max_attempts: u32,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingClient")
            .field("operation", &self.operation)
            .field("credentials", &self.credentials.len())
            .field("policy", &self.policy)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl RetryingClient {
    /// Creates a client for the named operation.
    #[must_use]
    pub fn new(
        operation: &'static str,
        credentials: Arc<dyn CredentialSource>,
        policy: RetryPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            operation,
            credentials,
            policy,
            max_attempts: max_attempts.max(1),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink for retry and rotation events.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the attempt limit.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calls `attempt` with the current credential until it succeeds, fails
    /// fatally, runs out of attempts, or `token` is cancelled.
    ///
    /// No lock is held while an attempt or a backoff sleep is pending.
    pub async fn call<T, F, Fut>(&self, token: &CancellationToken, mut attempt: F) -> Result<T, GenerationError>
    where
        T: CallOutput,
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        for n in 1..=self.max_attempts {
            if token.is_cancelled() {
                return Err(self.cancelled(token));
            }

            let lease = self.credentials.current();
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => return Err(self.cancelled(token)),
                outcome = attempt(lease.credential.clone()) => outcome,
            };

            let error = match outcome {
                Ok(value) if !value.is_empty_output() => {
                    debug!(operation = self.operation, attempt = n, credential = %lease.credential, "Call succeeded");
                    return Ok(value);
                }
                Ok(_) => UpstreamError::empty(format!("{} returned nothing", self.operation)),
                Err(error) => error,
            };

            let directive = self.policy.decide(&error);
            if !directive.retry {
                warn!(operation = self.operation, attempt = n, error = %error, "Non-retryable failure");
                return Err(GenerationError::Upstream(error));
            }

            if directive.rotate_credential && self.credentials.len() < 2 {
                warn!(
                    operation = self.operation,
                    attempt = n,
                    credential = %lease.credential,
                    "Credential rejected with no other credential to rotate to"
                );
            } else if directive.rotate_credential {
                let moved = self.credentials.advance_past(lease.position);
                warn!(
                    operation = self.operation,
                    attempt = n,
                    credential = %lease.credential,
                    position = lease.position,
                    moved,
                    "Credential rejected, rotating"
                );
                self.events.try_emit(&PipelineEvent::CredentialRotated {
                    operation: self.operation.to_string(),
                    rejected: lease.credential.fingerprint(),
                    position: lease.position,
                });
            }

            if n == self.max_attempts {
                warn!(operation = self.operation, attempts = n, error = %error, "Retries exhausted");
                return Err(GenerationError::Exhausted {
                    attempts: n,
                    last: error,
                });
            }

            let wait = self.policy.scaled_wait(directive.wait, n);
            debug!(
                operation = self.operation,
                attempt = n,
                class = %RetryClass::classify(&error),
                delay_ms = duration_ms(wait),
                error = %error,
                "Retrying after error"
            );
            self.events.try_emit(&PipelineEvent::RetryScheduled {
                operation: self.operation.to_string(),
                attempt: n,
                wait_ms: duration_ms(wait),
                reason: error.to_string(),
            });

            if !wait.is_zero() {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(self.cancelled(token)),
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        Err(GenerationError::DeadlineExceeded(format!(
            "{} made no attempt",
            self.operation
        )))
    }

    fn cancelled(&self, token: &CancellationToken) -> GenerationError {
        let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
        debug!(operation = self.operation, reason = %reason, "Call abandoned");
        GenerationError::DeadlineExceeded(format!("{}: {reason}", self.operation))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
