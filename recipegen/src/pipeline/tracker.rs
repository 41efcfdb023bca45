//! Stage bookkeeping for one run.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::core::{GenerationStage, RecordId};
use crate::errors::GenerationError;
use crate::events::{EventSink, PipelineEvent};
use crate::observability::SpanTimer;

/// Tracks the current stage of a run and reports transitions.
pub(crate) struct StageTracker {
    run_id: Uuid,
    record_id: RecordId,
    events: Arc<dyn EventSink>,
    current: GenerationStage,
    timer: Option<SpanTimer>,
    failed_at: Option<GenerationStage>,
}

impl StageTracker {
    pub(crate) fn new(run_id: Uuid, record_id: RecordId, events: Arc<dyn EventSink>) -> Self {
        Self {
            run_id,
            record_id,
            events,
            current: GenerationStage::Created,
            timer: None,
            failed_at: None,
        }
    }

    /// Enters `stage` unless the run has been cancelled.
    pub(crate) fn begin(&mut self, stage: GenerationStage, token: &CancellationToken) -> Result<(), GenerationError> {
        self.current = stage;
        if token.is_cancelled() {
            let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
            return self.end(Err(GenerationError::DeadlineExceeded(format!(
                "cancelled before {stage}: {reason}"
            ))));
        }

        debug!(run_id = %self.run_id, record_id = %self.record_id, stage = %stage, "Stage started");
        self.events.try_emit(&PipelineEvent::StageStarted {
            run_id: self.run_id,
            record_id: self.record_id,
            stage,
        });
        self.timer = Some(SpanTimer::start(stage.as_str()));
        Ok(())
    }

    /// Closes the current stage with its outcome.
    ///
    /// Only critical stages mark the run as failed.
    pub(crate) fn end<T>(&mut self, result: Result<T, GenerationError>) -> Result<T, GenerationError> {
        let stage = self.current;
        let duration_ms = self.timer.take().map_or(0.0, SpanTimer::finish);

        match &result {
            Ok(_) => {
                debug!(run_id = %self.run_id, stage = %stage, duration_ms, "Stage completed");
                self.events.try_emit(&PipelineEvent::StageCompleted {
                    run_id: self.run_id,
                    record_id: self.record_id,
                    stage,
                    duration_ms,
                });
            }
            Err(error) => {
                let critical = stage.is_critical();
                warn!(
                    run_id = %self.run_id,
                    record_id = %self.record_id,
                    stage = %stage,
                    critical,
                    error = %error,
                    "Stage failed"
                );
                self.events.try_emit(&PipelineEvent::StageFailed {
                    run_id: self.run_id,
                    record_id: self.record_id,
                    stage,
                    error: error.label().to_string(),
                    critical,
                });
                if critical && self.failed_at.is_none() {
                    self.failed_at = Some(stage);
                }
            }
        }
        result
    }

    pub(crate) fn current(&self) -> GenerationStage {
        self.current
    }

    /// The critical stage the run failed in, if any.
    pub(crate) fn failed_at(&self) -> Option<GenerationStage> {
        self.failed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    fn tracker() -> (StageTracker, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let tracker = StageTracker::new(Uuid::new_v4(), RecordId(1), sink.clone());
        (tracker, sink)
    }

    #[test]
    fn test_begin_and_end_emit_events() {
        let (mut tracker, sink) = tracker();
        let token = CancellationToken::new();

        tracker.begin(GenerationStage::TextGenerating, &token).unwrap();
        tracker.end(Ok(())).unwrap();

        let types: Vec<_> = sink.events().iter().map(PipelineEvent::event_type).collect();
        assert_eq!(types, vec!["stage.started", "stage.completed"]);
        assert_eq!(tracker.failed_at(), None);
    }

    #[test]
    fn test_begin_refuses_after_cancel() {
        let (mut tracker, sink) = tracker();
        let token = CancellationToken::new();
        token.cancel("deadline");

        let err = tracker.begin(GenerationStage::Finalizing, &token).unwrap_err();

        assert!(err.is_deadline());
        assert_eq!(tracker.failed_at(), Some(GenerationStage::Finalizing));
        assert!(sink.events_of_type("stage.started").is_empty());
        assert_eq!(sink.events_of_type("stage.failed").len(), 1);
    }

    #[test]
    fn test_tagging_failure_is_not_critical() {
        let (mut tracker, sink) = tracker();
        let token = CancellationToken::new();

        tracker.begin(GenerationStage::TaggingAssociating, &token).unwrap();
        let _ = tracker.end::<()>(Err(GenerationError::Payload("bad".into())));

        assert_eq!(tracker.failed_at(), None);
        assert!(matches!(
            sink.events_of_type("stage.failed")[0],
            PipelineEvent::StageFailed { critical: false, .. }
        ));
    }
}
