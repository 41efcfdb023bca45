//! Typed events emitted while a generation run progresses.

use serde::Serialize;
use uuid::Uuid;

use crate::core::{GenerationStage, RecordId};

/// Something observable that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A stage began.
    StageStarted {
        /// Run identifier.
        run_id: Uuid,
        /// The record being generated.
        record_id: RecordId,
        /// The stage.
        stage: GenerationStage,
    },
    /// A stage committed.
    StageCompleted {
        /// Run identifier.
        run_id: Uuid,
        /// The record being generated.
        record_id: RecordId,
        /// The stage.
        stage: GenerationStage,
        /// Wall time spent in the stage.
        duration_ms: f64,
    },
    /// A stage failed.
    StageFailed {
        /// Run identifier.
        run_id: Uuid,
        /// The record being generated.
        record_id: RecordId,
        /// The stage.
        stage: GenerationStage,
        /// Error label.
        error: String,
        /// Whether the failure ended the run.
        critical: bool,
    },
    /// The retrying client is about to try again.
    RetryScheduled {
        /// The wrapped call ("text" or "image").
        operation: String,
        /// The attempt that just failed, 1-based.
        attempt: u32,
        /// How long the client will wait first.
        wait_ms: u64,
        /// Why the attempt failed.
        reason: String,
    },
    /// A rejected credential caused the pool to move on.
    CredentialRotated {
        /// The wrapped call.
        operation: String,
        /// Fingerprint of the rejected credential.
        rejected: String,
        /// Pool position of the rejected credential.
        position: usize,
    },
    /// A run reached a terminal state.
    RunFinished {
        /// Run identifier.
        run_id: Uuid,
        /// The record being generated.
        record_id: RecordId,
        /// `completed` or `failed`.
        stage: GenerationStage,
        /// Error label when the run failed.
        error: Option<String>,
        /// Total run time.
        duration_ms: f64,
    },
}

impl PipelineEvent {
    /// Returns the dotted event type, e.g. `stage.started`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::RetryScheduled { .. } => "retry.scheduled",
            Self::CredentialRotated { .. } => "credential.rotated",
            Self::RunFinished { .. } => "run.finished",
        }
    }

    /// Returns the stage the event refers to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<GenerationStage> {
        match self {
            Self::StageStarted { stage, .. }
            | Self::StageCompleted { stage, .. }
            | Self::StageFailed { stage, .. }
            | Self::RunFinished { stage, .. } => Some(*stage),
            Self::RetryScheduled { .. } | Self::CredentialRotated { .. } => None,
        }
    }

    /// Serializes the event payload.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
