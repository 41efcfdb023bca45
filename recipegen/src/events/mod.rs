//! Event emission for generation runs.
//!
//! Runs report stage transitions, retries and credential rotations as typed
//! [`PipelineEvent`]s to an injected [`EventSink`].

mod event;
mod sink;

pub use event::PipelineEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
