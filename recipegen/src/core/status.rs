//! Generation stage enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of one generation run.
///
/// Runs move forward through the working stages in declaration order and
/// end in exactly one of [`GenerationStage::Completed`] or
/// [`GenerationStage::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    /// The draft exists and the run has not started.
    Created,
    /// Calling the text-generation service.
    TextGenerating,
    /// Writing title, body and history in one transaction.
    PersistingCore,
    /// Resolving and replacing tag associations.
    TaggingAssociating,
    /// Calling the image-generation service.
    ImageGenerating,
    /// Pushing the image to object storage and recording its location.
    Uploading,
    /// Flipping the completion flag.
    Finalizing,
    /// Every stage succeeded.
    Completed,
    /// A critical stage failed or the run was cancelled.
    Failed,
}

impl Default for GenerationStage {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GenerationStage {
    /// The working stages, in execution order.
    pub const WORKING: [Self; 6] = [
        Self::TextGenerating,
        Self::PersistingCore,
        Self::TaggingAssociating,
        Self::ImageGenerating,
        Self::Uploading,
        Self::Finalizing,
    ];

    /// Returns the snake_case name used in logs and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::TextGenerating => "text_generating",
            Self::PersistingCore => "persisting_core",
            Self::TaggingAssociating => "tagging_associating",
            Self::ImageGenerating => "image_generating",
            Self::Uploading => "uploading",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if a failure in this stage aborts the run.
    ///
    /// Tag association is enrichment; everything else is critical.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        !matches!(self, Self::TaggingAssociating)
    }

    /// Returns the stage that follows this one on success.
    #[must_use]
    pub fn next(&self) -> Self {
        match self {
            Self::Created => Self::TextGenerating,
            Self::TextGenerating => Self::PersistingCore,
            Self::PersistingCore => Self::TaggingAssociating,
            Self::TaggingAssociating => Self::ImageGenerating,
            Self::ImageGenerating => Self::Uploading,
            Self::Uploading => Self::Finalizing,
            Self::Finalizing | Self::Completed => Self::Completed,
            Self::Failed => Self::Failed,
        }
    }
}
