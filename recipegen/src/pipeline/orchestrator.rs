//! The generation orchestrator.
//!
//! One call to [`GenerationOrchestrator::run`] drives one record through
//! text generation, core persistence, tagging, image generation, upload and
//! finalization. Each stage starts only after the previous one committed,
//! and the completion flag is written last, by this module only.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::config::{PipelineConfig, PromptTemplates, RetrySettings};
use crate::core::{
    CredentialClass, GenerationMode, GenerationRequest, GenerationStage, HistoryEntry, RecipeDef, RecordId,
};
use crate::credentials::{CredentialPool, CredentialSource};
use crate::errors::GenerationError;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::SpanTimer;
use crate::prompts::build_text_request;
use crate::providers::{GeneratedImage, ImageGenerator, TextCompletion, TextGenerator};
use crate::retry::RetryingClient;
use crate::store::{image_key, ObjectStorage, PersistenceGateway};
use crate::tagging::resolve_tags;

use super::tracker::StageTracker;

/// The outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    /// Run identifier, shared with events and log spans.
    pub run_id: Uuid,
    /// The record the run wrote to.
    pub record_id: RecordId,
    /// `Completed` or `Failed`.
    pub final_stage: GenerationStage,
    /// The critical stage that failed, if any.
    pub failed_at: Option<GenerationStage>,
    /// The terminal error, if any.
    pub error: Option<GenerationError>,
    /// Total run time.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns true if the run finalized the record.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.final_stage == GenerationStage::Completed
    }

    /// Builds the report for a run that ignored cancellation past its grace period.
    #[must_use]
    pub fn abandoned(run_id: Uuid, record_id: RecordId, reason: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            run_id,
            record_id,
            final_stage: GenerationStage::Failed,
            failed_at: None,
            error: Some(GenerationError::DeadlineExceeded(reason.into())),
            duration_ms,
        }
    }
}

/// Drives generation runs against injected collaborators.
pub struct GenerationOrchestrator {
    store: Arc<dyn PersistenceGateway>,
    objects: Arc<dyn ObjectStorage>,
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    shared_credentials: Arc<dyn CredentialSource>,
    templates: PromptTemplates,
    retry: RetrySettings,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("shared_credentials", &self.shared_credentials.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GenerationOrchestrator {
    /// Creates an orchestrator with default templates and retry settings.
    #[must_use]
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        objects: Arc<dyn ObjectStorage>,
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        shared_credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            store,
            objects,
            text,
            images,
            shared_credentials,
            templates: PromptTemplates::default(),
            retry: RetrySettings::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Applies templates and retry settings from configuration.
    #[must_use]
    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.templates = config.prompts.clone();
        self.retry = config.retry.clone();
        self
    }

    /// Sets the retry settings.
    #[must_use]
    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the prompt templates.
    #[must_use]
    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the data store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PersistenceGateway> {
        &self.store
    }

    /// Runs every stage for `record` under a fresh run id.
    pub async fn run(&self, record: RecordId, request: &GenerationRequest, token: &CancellationToken) -> RunReport {
        self.run_with_id(Uuid::new_v4(), record, request, token).await
    }

    /// Runs every stage for `record`.
    ///
    /// Never panics and never returns early without a report; the record is
    /// left as the last committed stage wrote it.
    pub async fn run_with_id(
        &self,
        run_id: Uuid,
        record: RecordId,
        request: &GenerationRequest,
        token: &CancellationToken,
    ) -> RunReport {
        let timer = SpanTimer::start("run");
        let mut tracker = StageTracker::new(run_id, record, Arc::clone(&self.events));

        let result = self.execute(&mut tracker, record, request, token).await;
        let duration_ms = timer.finish();

        let (final_stage, error) = match result {
            Ok(()) => (GenerationStage::Completed, None),
            Err(error) => (GenerationStage::Failed, Some(error)),
        };

        match &error {
            None => info!(%run_id, record_id = %record, duration_ms, "Generation completed"),
            Some(error) => warn!(
                %run_id,
                record_id = %record,
                stage = %tracker.current(),
                error = %error,
                duration_ms,
                "Generation failed"
            ),
        }
        self.events.try_emit(&PipelineEvent::RunFinished {
            run_id,
            record_id: record,
            stage: final_stage,
            error: error.as_ref().map(|e| e.label().to_string()),
            duration_ms,
        });

        RunReport {
            run_id,
            record_id: record,
            final_stage,
            failed_at: tracker.failed_at(),
            error,
            duration_ms,
        }
    }

    async fn execute(
        &self,
        tracker: &mut StageTracker,
        record: RecordId,
        request: &GenerationRequest,
        token: &CancellationToken,
    ) -> Result<(), GenerationError> {
        let credentials = self.credentials_for(request);

        tracker.begin(GenerationStage::TextGenerating, token)?;
        let completion = tracker.end(self.generate_text(&credentials, record, request, token).await)?;

        tracker.begin(GenerationStage::PersistingCore, token)?;
        let recipe = tracker.end(self.persist_core(record, request, &completion).await)?;

        tracker.begin(GenerationStage::TaggingAssociating, token)?;
        if let Err(error) = tracker.end(self.associate_tags(record, &recipe.hashtags).await) {
            warn!(record_id = %record, error = %error, "Continuing without tags");
        }

        tracker.begin(GenerationStage::ImageGenerating, token)?;
        let image = tracker.end(self.generate_image(&credentials, &recipe.image_prompt, token).await)?;

        tracker.begin(GenerationStage::Uploading, token)?;
        tracker.end(self.upload(record, &image, token).await)?;

        tracker.begin(GenerationStage::Finalizing, token)?;
        tracker.end(
            self.store
                .set_completion_flag(record, true)
                .await
                .map_err(GenerationError::from),
        )
    }

    fn credentials_for(&self, request: &GenerationRequest) -> Arc<dyn CredentialSource> {
        match &request.credential_class {
            CredentialClass::Personal(credential) => Arc::new(CredentialPool::single(credential.clone())),
            CredentialClass::Shared => Arc::clone(&self.shared_credentials),
        }
    }

    fn client(&self, operation: &'static str, credentials: &Arc<dyn CredentialSource>, max_attempts: u32) -> RetryingClient {
        RetryingClient::new(operation, Arc::clone(credentials), self.retry.policy(), max_attempts)
            .with_events(Arc::clone(&self.events))
    }

    async fn generate_text(
        &self,
        credentials: &Arc<dyn CredentialSource>,
        record: RecordId,
        request: &GenerationRequest,
        token: &CancellationToken,
    ) -> Result<TextCompletion, GenerationError> {
        request.validate().map_err(GenerationError::FatalInput)?;

        let history = match &request.mode {
            GenerationMode::Initial => Vec::new(),
            GenerationMode::Refine { .. } => self.store.load_history(record).await?,
        };
        let text_request = build_text_request(&self.templates, request, &history);
        let text_request = &text_request;

        let client = self.client("text", credentials, self.retry.text_max_attempts);
        client
            .call(token, |credential| async move {
                self.text.generate_text(&credential, text_request).await
            })
            .await
    }

    async fn persist_core(
        &self,
        record: RecordId,
        request: &GenerationRequest,
        completion: &TextCompletion,
    ) -> Result<RecipeDef, GenerationError> {
        let recipe = RecipeDef::from_json(&completion.arguments)?;
        recipe.validate().map_err(GenerationError::FatalInput)?;
        if recipe.image_prompt.trim().is_empty() {
            return Err(GenerationError::FatalInput("payload has no image prompt".to_string()));
        }

        let body = recipe.body().encode()?;
        let prompt = match &request.mode {
            GenerationMode::Initial => request.prompt.as_str(),
            GenerationMode::Refine { followup } => followup.as_str(),
        };
        let entry = HistoryEntry::new(prompt, completion.arguments.clone());

        self.store
            .update_core_fields(record, &recipe.title, &body, &entry)
            .await?;
        Ok(recipe)
    }

    async fn associate_tags(&self, record: RecordId, hashtags: &[String]) -> Result<(), GenerationError> {
        let tags = resolve_tags(self.store.as_ref(), hashtags).await?;
        self.store.replace_tag_associations(record, &tags).await?;
        Ok(())
    }

    async fn generate_image(
        &self,
        credentials: &Arc<dyn CredentialSource>,
        prompt: &str,
        token: &CancellationToken,
    ) -> Result<GeneratedImage, GenerationError> {
        let client = self.client("image", credentials, self.retry.image_max_attempts);
        client
            .call(token, |credential| async move {
                self.images.generate_image(&credential, prompt).await
            })
            .await
    }

    async fn upload(
        &self,
        record: RecordId,
        image: &GeneratedImage,
        token: &CancellationToken,
    ) -> Result<(), GenerationError> {
        let location = self.objects.upload(&image_key(record), &image.bytes).await?;
        if token.is_cancelled() {
            return Err(GenerationError::DeadlineExceeded(
                "cancelled before recording image location".to_string(),
            ));
        }
        self.store.update_image_location(record, &location).await?;
        Ok(())
    }
}
