//! Generation run orchestration and execution.
//!
//! This module provides:
//! - GenerationOrchestrator, the stage-by-stage controller for one record
//! - GenerationLauncher, detached deadline-bound execution
//! - RunReport, the outcome a completion hook observes

mod integration_tests;
mod launcher;
mod orchestrator;
mod tracker;

pub use launcher::{CompletionHook, GenerationLauncher, CANCEL_GRACE};
pub use orchestrator::{GenerationOrchestrator, RunReport};
