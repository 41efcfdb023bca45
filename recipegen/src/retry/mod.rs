//! Retry classification and the retrying client.
//!
//! This module provides:
//! - RetryClass, the closed classification of upstream failures
//! - RetryPolicy, mapping a failure to a retry directive and wait
//! - RetryingClient, the bounded loop shared by text and image calls

mod client;
mod policy;

pub use client::{CallOutput, RetryingClient};
pub use policy::{JitterStrategy, RetryClass, RetryDirective, RetryPolicy, DEFAULT_BACKOFF};
