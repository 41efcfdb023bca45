//! Testing utilities for generation runs.
//!
//! This module provides:
//! - Scripted text and image generators that record the credentials used
//! - A fixed-answer rate limiter
//! - Canned recipe payloads and upstream errors

pub mod fixtures;
mod mocks;

pub use mocks::{FixedRateLimiter, ScriptedImageGenerator, ScriptedTextGenerator};
