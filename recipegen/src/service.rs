//! Entry points for inbound generation requests.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::core::{AccountId, GenerationRequest, RecordId};
use crate::errors::SubmitError;
use crate::pipeline::GenerationLauncher;
use crate::ratelimit::AdmissionGate;
use crate::store::PersistenceGateway;

/// Admits requests, drafts records and hands them to the launcher.
///
/// Both operations return as soon as the run is launched; callers learn the
/// outcome by fetching the record later.
#[derive(Clone)]
pub struct GenerationService {
    store: Arc<dyn PersistenceGateway>,
    gate: AdmissionGate,
    launcher: GenerationLauncher,
}

impl std::fmt::Debug for GenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationService")
            .field("gate", &self.gate)
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

impl GenerationService {
    /// Creates a service.
    #[must_use]
    pub fn new(store: Arc<dyn PersistenceGateway>, gate: AdmissionGate, launcher: GenerationLauncher) -> Self {
        Self { store, gate, launcher }
    }

    /// Starts generation of a new record and returns its id immediately.
    #[instrument(skip_all, fields(source = %source, owner = %owner))]
    pub async fn submit(
        &self,
        source: IpAddr,
        owner: AccountId,
        request: GenerationRequest,
    ) -> Result<RecordId, SubmitError> {
        self.admit(source, &request)?;

        let record = self.store.create_draft(owner, &request.prompt).await?;
        let run_id = self.launcher.launch(record, request);
        info!(record_id = %record, %run_id, "Generation submitted");
        Ok(record)
    }

    /// Refines an existing record with a follow-up instruction.
    ///
    /// `preferences` supplies unit system, requirements and credential class;
    /// its prompt is replaced by the one the record was drafted from. The
    /// completion flag and the previous image are cleared before the run
    /// starts.
    #[instrument(skip_all, fields(source = %source, record_id = %record))]
    pub async fn refine(
        &self,
        source: IpAddr,
        record: RecordId,
        followup: impl Into<String> + Send,
        preferences: GenerationRequest,
    ) -> Result<(), SubmitError> {
        let stored = self.store.get_record(record).await?;
        let request = GenerationRequest {
            prompt: stored.prompt,
            ..preferences
        }
        .refining(followup);
        self.admit(source, &request)?;

        self.store.reset_for_refinement(record).await?;
        let run_id = self.launcher.launch(record, request);
        info!(%run_id, "Refinement submitted");
        Ok(())
    }

    fn admit(&self, source: IpAddr, request: &GenerationRequest) -> Result<(), SubmitError> {
        self.gate.admit_address(source)?;
        request.validate().map_err(SubmitError::InvalidRequest)?;
        if request.credential_class.is_shared() {
            self.gate.admit_shared()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use crate::errors::AdmissionError;
    use crate::pipeline::{GenerationOrchestrator, RunReport};
    use crate::store::{InMemoryObjectStorage, InMemoryStore};
    use crate::testing::{fixtures, FixedRateLimiter, ScriptedImageGenerator, ScriptedTextGenerator};
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    struct Fixture {
        service: GenerationService,
        store: Arc<InMemoryStore>,
        text: Arc<ScriptedTextGenerator>,
        images: Arc<ScriptedImageGenerator>,
        reports: mpsc::UnboundedReceiver<RunReport>,
    }

    fn fixture(address: FixedRateLimiter, shared: FixedRateLimiter) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let text = Arc::new(ScriptedTextGenerator::new());
        let images = Arc::new(ScriptedImageGenerator::new());
        let orchestrator = GenerationOrchestrator::new(
            store.clone(),
            Arc::new(InMemoryObjectStorage::new()),
            text.clone(),
            images.clone(),
            Arc::new(fixtures::pool(&["sk-shared"])),
        );
        let (tx, reports) = mpsc::unbounded_channel();
        let launcher = GenerationLauncher::new(Arc::new(orchestrator), Duration::from_secs(300))
            .with_completion_hook(Arc::new(move |report| {
                let _ = tx.send(report);
            }));
        let gate = AdmissionGate::new(Arc::new(address), Arc::new(shared));
        Fixture {
            service: GenerationService::new(store.clone(), gate, launcher),
            store,
            text,
            images,
            reports,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_returns_draft_then_completes() {
        let mut f = fixture(FixedRateLimiter::allow(), FixedRateLimiter::allow());
        f.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        f.images.push_ok(b"jpeg".to_vec());

        let record = f
            .service
            .submit(SOURCE, AccountId(1), GenerationRequest::new("soup"))
            .await
            .unwrap();
        let draft = f.store.record(record).unwrap();
        assert_eq!(draft.owner, AccountId(1));

        let report = f.reports.recv().await.unwrap();
        assert!(report.is_completed());
        assert!(f.store.record(record).unwrap().completed);
    }

    #[tokio::test]
    async fn test_address_throttle_rejects_before_drafting() {
        let f = fixture(FixedRateLimiter::deny(), FixedRateLimiter::allow());

        let err = f
            .service
            .submit(SOURCE, AccountId(1), GenerationRequest::new("soup"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Admission(AdmissionError::AddressThrottled(_))
        ));
        assert!(f.store.record(RecordId(1)).is_none());
    }

    #[tokio::test]
    async fn test_shared_saturation_spares_personal_keys() {
        let mut f = fixture(FixedRateLimiter::allow(), FixedRateLimiter::deny());

        let err = f
            .service
            .submit(SOURCE, AccountId(1), GenerationRequest::new("soup"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Admission(AdmissionError::SharedCredentialSaturated)
        ));

        f.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        f.images.push_ok(b"jpeg".to_vec());
        let personal = GenerationRequest::new("soup").with_personal_credential(Credential::new("sk-mine"));
        let record = f.service.submit(SOURCE, AccountId(1), personal).await.unwrap();

        assert!(f.reports.recv().await.unwrap().is_completed());
        assert!(f.store.record(record).unwrap().completed);
        assert_eq!(f.text.credentials_seen(), vec!["sk-mine"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_prompt_lets_the_model_choose() {
        let mut f = fixture(FixedRateLimiter::allow(), FixedRateLimiter::allow());
        f.text.push_ok(fixtures::recipe_json("Surprise Stew", &["stew"]));
        f.images.push_ok(b"jpeg".to_vec());

        let record = f
            .service
            .submit(SOURCE, AccountId(1), GenerationRequest::new(""))
            .await
            .unwrap();

        assert!(f.reports.recv().await.unwrap().is_completed());
        assert_eq!(f.store.record(record).unwrap().title.as_deref(), Some("Surprise Stew"));
    }

    #[tokio::test]
    async fn test_blank_personal_credential_is_invalid() {
        let f = fixture(FixedRateLimiter::allow(), FixedRateLimiter::allow());
        let request = GenerationRequest::new("soup").with_personal_credential(Credential::new(""));
        let err = f.service.submit(SOURCE, AccountId(1), request).await.unwrap_err();
        assert!(matches!(err, SubmitError::InvalidRequest(_)));
        assert!(f.store.record(RecordId(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refine_resets_completion_and_appends_history() {
        let mut f = fixture(FixedRateLimiter::allow(), FixedRateLimiter::allow());
        f.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        f.images.push_ok(b"v1".to_vec());
        let record = f
            .service
            .submit(SOURCE, AccountId(1), GenerationRequest::new("soup"))
            .await
            .unwrap();
        assert!(f.reports.recv().await.unwrap().is_completed());
        assert!(f.store.record(record).unwrap().image_location.is_some());

        // The refinement's image call fails: the flag stays cleared and the
        // previous image is not paired with the new body.
        f.text.push_ok(fixtures::recipe_json("Noodle Soup", &["soup", "noodles"]));
        f.images.push_err_times(&crate::errors::UpstreamError::status(400, "bad prompt"), 1);
        f.service
            .refine(SOURCE, record, "add noodles", GenerationRequest::new("ignored"))
            .await
            .unwrap();
        let report = f.reports.recv().await.unwrap();

        assert!(!report.is_completed());
        let stored = f.store.record(record).unwrap();
        assert!(!stored.completed);
        assert_eq!(stored.image_location, None);
        assert_eq!(stored.title.as_deref(), Some("Noodle Soup"));
        assert_eq!(f.store.tag_names(record), vec!["noodles", "soup"]);
        let history = f.store.history(record);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].prompt, "add noodles");

        let replayed = &f.text.requests()[1];
        assert!(replayed.last_user_message().is_some_and(|m| m.contains("add noodles")));
        assert!(replayed.messages.iter().any(|m| matches!(
            m,
            crate::prompts::ChatTurn::User { content } if content.contains("soup")
        )));
    }

    #[tokio::test]
    async fn test_refine_unknown_record() {
        let f = fixture(FixedRateLimiter::allow(), FixedRateLimiter::allow());
        let err = f
            .service
            .refine(SOURCE, RecordId(99), "more salt", GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Draft(_)));
    }
}
