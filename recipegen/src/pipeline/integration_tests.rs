//! End-to-end runs over in-memory collaborators.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::config::RetrySettings;
    use crate::core::{AccountId, GenerationRequest, GenerationStage, RecordId, TagId};
    use crate::credentials::{CredentialPool, CredentialSource};
    use crate::errors::{GenerationError, UpstreamError};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{GenerationLauncher, GenerationOrchestrator, RunReport};
    use crate::store::{image_key, InMemoryObjectStorage, InMemoryStore, MockPersistenceGateway, PersistenceGateway, StoreOp};
    use crate::testing::{fixtures, ScriptedImageGenerator, ScriptedTextGenerator};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct World {
        store: Arc<InMemoryStore>,
        objects: Arc<InMemoryObjectStorage>,
        text: Arc<ScriptedTextGenerator>,
        images: Arc<ScriptedImageGenerator>,
        pool: Arc<CredentialPool>,
        events: Arc<CollectingEventSink>,
        orchestrator: Arc<GenerationOrchestrator>,
    }

    impl World {
        fn new(keys: &[&str]) -> Self {
            let store = Arc::new(InMemoryStore::new());
            let objects = Arc::new(InMemoryObjectStorage::new());
            let text = Arc::new(ScriptedTextGenerator::new());
            let images = Arc::new(ScriptedImageGenerator::new());
            let pool = Arc::new(fixtures::pool(keys));
            let events = Arc::new(CollectingEventSink::new());
            let orchestrator = GenerationOrchestrator::new(
                store.clone(),
                objects.clone(),
                text.clone(),
                images.clone(),
                pool.clone(),
            )
            .with_retry_settings(RetrySettings::default())
            .with_events(events.clone());
            Self {
                store,
                objects,
                text,
                images,
                pool,
                events,
                orchestrator: Arc::new(orchestrator),
            }
        }

        async fn draft(&self, prompt: &str) -> RecordId {
            self.store.create_draft(AccountId(7), prompt).await.unwrap()
        }

        async fn run(&self, record: RecordId, request: &GenerationRequest) -> RunReport {
            self.orchestrator.run(record, request, &CancellationToken::new()).await
        }

        fn launcher(&self, deadline: Duration) -> (GenerationLauncher, mpsc::UnboundedReceiver<RunReport>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let launcher = GenerationLauncher::new(self.orchestrator.clone(), deadline).with_completion_hook(
                Arc::new(move |report| {
                    let _ = tx.send(report);
                }),
            );
            (launcher, rx)
        }

        fn assert_completion_implies_population(&self, record: RecordId) {
            let stored = self.store.record(record).unwrap();
            if stored.completed {
                assert!(stored.has_body(), "completed record without body");
                assert!(stored.has_image(), "completed record without image");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_calls_succeed_first_try() {
        let world = World::new(&["sk-1", "sk-2"]);
        world
            .text
            .push_ok(fixtures::recipe_json("Chicken Soup", &["Soup", "#ComfortFood", "chicken", "soup"]));
        world.images.push_ok(b"jpeg".to_vec());
        let record = world.draft("chicken soup").await;

        let report = world.run(record, &GenerationRequest::new("chicken soup")).await;

        assert!(report.is_completed(), "{:?}", report.error);
        let stored = world.store.record(record).unwrap();
        assert!(stored.completed);
        assert_eq!(stored.title.as_deref(), Some("Chicken Soup"));
        assert!(stored.has_body());
        assert_eq!(
            stored.image_location,
            Some(format!("memory://{}", image_key(record)))
        );
        assert_eq!(world.objects.get(&image_key(record)), Some(b"jpeg".to_vec()));
        assert_eq!(world.store.tag_names(record), vec!["chicken", "comfortfood", "soup"]);

        let history = world.store.history(record);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prompt, "chicken soup");
        assert_eq!(world.images.prompts(), vec!["A steaming bowl of Chicken Soup"]);
        assert_eq!(world.store.completion_writes(), 1);
        assert_eq!(world.pool.position(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credential_rotates() {
        let world = World::new(&["sk-1", "sk-2"]);
        world.text.push_err(fixtures::rejected());
        world.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        world.images.push_ok(b"jpeg".to_vec());
        let record = world.draft("soup").await;

        let report = world.run(record, &GenerationRequest::new("soup")).await;

        assert!(report.is_completed());
        assert_eq!(world.text.credentials_seen(), vec!["sk-1", "sk-2"]);
        assert_eq!(world.images.credentials_seen(), vec!["sk-2"]);
        assert_eq!(world.pool.position(), 1);
        assert_eq!(world.events.events_of_type("credential.rotated").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_exhausts_retries() {
        let world = World::new(&["sk-1"]);
        world.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        world.images.push_err_times(&fixtures::overloaded(), 3);
        let record = world.draft("soup").await;

        let started = tokio::time::Instant::now();
        let report = world.run(record, &GenerationRequest::new("soup")).await;

        assert_eq!(report.failed_at, Some(GenerationStage::ImageGenerating));
        match &report.error {
            Some(GenerationError::Exhausted { attempts, last }) => {
                assert_eq!(*attempts, 3);
                assert_eq!(last.status_code(), Some(429));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
        // 2s after the first attempt, 4s after the second.
        assert!(started.elapsed() >= Duration::from_secs(6));

        let stored = world.store.record(record).unwrap();
        assert!(stored.has_body());
        assert!(!stored.completed);
        assert_eq!(stored.image_location, None);
        assert!(world.objects.is_empty());
        assert_eq!(world.events.events_of_type("retry.scheduled").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_image_generation() {
        let world = World::new(&["sk-1"]);
        world.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        world.images.set_delay(Duration::from_secs(120));
        world.images.push_ok(b"jpeg".to_vec());
        let record = world.draft("soup").await;
        let (launcher, mut rx) = world.launcher(Duration::from_secs(30));

        launcher.launch(record, GenerationRequest::new("soup"));
        let report = rx.recv().await.unwrap();

        assert_eq!(report.failed_at, Some(GenerationStage::ImageGenerating));
        assert!(report.error.as_ref().is_some_and(GenerationError::is_deadline));

        // Let the abandoned image call's delay run out.
        tokio::time::sleep(Duration::from_secs(300)).await;

        let stored = world.store.record(record).unwrap();
        assert!(stored.has_body());
        assert!(!stored.has_image());
        assert!(!stored.completed);
        assert_eq!(world.store.completion_writes(), 0);
        assert!(world
            .events
            .events_of_type("stage.started")
            .iter()
            .all(|e| e.stage() != Some(GenerationStage::Finalizing)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_implies_full_population() {
        let failures: Vec<Box<dyn Fn(&World)>> = vec![
            Box::new(|_: &World| {}),
            Box::new(|w: &World| w.store.fail_on(StoreOp::CoreFields)),
            Box::new(|w: &World| w.store.fail_on(StoreOp::Tags)),
            Box::new(|w: &World| w.store.fail_on(StoreOp::ImageLocation)),
            Box::new(|w: &World| w.store.fail_on(StoreOp::Completion)),
            Box::new(|w: &World| w.objects.fail_uploads(true)),
            Box::new(|w: &World| w.images.push_err_times(&UpstreamError::status(400, "bad prompt"), 1)),
        ];

        for (i, inject) in failures.iter().enumerate() {
            let world = World::new(&["sk-1"]);
            world.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
            inject(&world);
            world.images.push_ok(b"jpeg".to_vec());
            let record = world.draft("soup").await;

            let report = world.run(record, &GenerationRequest::new("soup")).await;

            world.assert_completion_implies_population(record);
            let completed = world.store.record(record).unwrap().completed;
            assert_eq!(report.is_completed(), completed, "case {i}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_failure_keeps_committed_body() {
        let world = World::new(&["sk-1"]);
        world.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        world.images.push_ok(b"jpeg".to_vec());
        let record = world.draft("soup").await;
        assert!(world.run(record, &GenerationRequest::new("soup")).await.is_completed());
        let before = world.store.record(record).unwrap();

        // A refinement whose payload has no main recipe fails before writing.
        world.text.push_ok(r#"{"title": "Soup 2", "image_prompt": "soup"}"#);
        let report = world
            .run(record, &GenerationRequest::new("soup").refining("add noodles"))
            .await;

        assert_eq!(report.failed_at, Some(GenerationStage::PersistingCore));
        let after = world.store.record(record).unwrap();
        assert_eq!(after.title, before.title);
        assert_eq!(after.body, before.body);
        assert_eq!(world.store.history(record).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tagging_twice_yields_same_set() {
        let world = World::new(&["sk-1"]);
        let tags = ["Soup", "#soup", "Chicken", "one-pot"];
        for _ in 0..2 {
            world.text.push_ok(fixtures::recipe_json("Soup", &tags));
            world.images.push_ok(b"jpeg".to_vec());
        }
        let record = world.draft("soup").await;

        assert!(world.run(record, &GenerationRequest::new("soup")).await.is_completed());
        let first = world.store.record(record).unwrap().tags;
        assert!(world
            .run(record, &GenerationRequest::new("soup").refining("same again"))
            .await
            .is_completed());
        let second = world.store.record(record).unwrap().tags;

        assert_eq!(first, second);
        assert_eq!(second.len(), 3);
        assert_eq!(world.store.tag_count(), 3);
        assert_eq!(world.store.tag_names(record), vec!["chicken", "onepot", "soup"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_stops_at_first_good_credential() {
        let world = World::new(&["sk-0", "sk-1", "sk-2", "sk-3"]);
        world.pool.advance();
        world.text.push_err(fixtures::rejected());
        world.text.push_err(fixtures::rejected());
        world.text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        world.images.push_ok(b"jpeg".to_vec());
        let record = world.draft("soup").await;

        let report = world.run(record, &GenerationRequest::new("soup")).await;

        assert!(report.is_completed());
        let seen = world.text.credentials_seen();
        assert!(seen.len() <= world.pool.len());
        assert_eq!(seen, vec!["sk-1", "sk-2", "sk-3"]);
        assert_eq!(world.pool.position(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_credential_rejected_wraps_and_exhausts() {
        let world = World::new(&["sk-0", "sk-1"]);
        for _ in 0..5 {
            world.text.push_err(fixtures::rejected());
        }
        let record = world.draft("soup").await;

        let report = world.run(record, &GenerationRequest::new("soup")).await;

        assert!(matches!(report.error, Some(GenerationError::Exhausted { attempts: 5, .. })));
        assert_eq!(
            world.text.credentials_seen(),
            vec!["sk-0", "sk-1", "sk-0", "sk-1", "sk-0"]
        );
        assert!(!world.store.record(record).unwrap().has_body());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_text_error_writes_nothing() {
        let mut gateway = MockPersistenceGateway::new();
        gateway.expect_load_history().never();
        gateway.expect_update_core_fields().never();
        gateway.expect_replace_tag_associations().never();
        gateway.expect_update_image_location().never();
        gateway.expect_set_completion_flag().never();

        let text = Arc::new(ScriptedTextGenerator::new());
        text.push_err(UpstreamError::status(400, "bad request"));
        let orchestrator = GenerationOrchestrator::new(
            Arc::new(gateway),
            Arc::new(InMemoryObjectStorage::new()),
            text.clone(),
            Arc::new(ScriptedImageGenerator::new()),
            Arc::new(fixtures::pool(&["sk-1", "sk-2"])),
        );

        let report = orchestrator
            .run(RecordId(1), &GenerationRequest::new("soup"), &CancellationToken::new())
            .await;

        assert_eq!(report.failed_at, Some(GenerationStage::TextGenerating));
        assert!(matches!(report.error, Some(GenerationError::Upstream(_))));
        assert_eq!(text.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_failure_never_finalizes() {
        let mut gateway = MockPersistenceGateway::new();
        gateway
            .expect_update_core_fields()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        gateway
            .expect_find_or_create_tag()
            .returning(|_| Ok(TagId(1)));
        gateway
            .expect_replace_tag_associations()
            .times(1)
            .returning(|_, _| Ok(()));
        gateway.expect_update_image_location().never();
        gateway.expect_set_completion_flag().never();

        let text = Arc::new(ScriptedTextGenerator::new());
        text.push_ok(fixtures::recipe_json("Soup", &["soup"]));
        let images = Arc::new(ScriptedImageGenerator::new());
        images.push_err_times(&fixtures::server_fault(), 3);
        let orchestrator = GenerationOrchestrator::new(
            Arc::new(gateway),
            Arc::new(InMemoryObjectStorage::new()),
            text,
            images.clone(),
            Arc::new(fixtures::pool(&["sk-1"])),
        );

        let report = orchestrator
            .run(RecordId(1), &GenerationRequest::new("soup"), &CancellationToken::new())
            .await;

        assert_eq!(report.failed_at, Some(GenerationStage::ImageGenerating));
        assert_eq!(images.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_are_independent() {
        let world = World::new(&["sk-1", "sk-2"]);
        let mut records = Vec::new();
        for i in 0u8..4 {
            world.text.push_ok(fixtures::recipe_json(&format!("Soup {i}"), &["soup"]));
            world.images.push_ok(vec![i]);
            records.push(world.draft("soup").await);
        }
        let (launcher, mut rx) = world.launcher(Duration::from_secs(300));

        for record in &records {
            launcher.launch(*record, GenerationRequest::new("soup"));
        }
        let mut completed = 0;
        for _ in 0..records.len() {
            if rx.recv().await.unwrap().is_completed() {
                completed += 1;
            }
        }

        assert_eq!(completed, records.len());
        for record in records {
            world.assert_completion_implies_population(record);
        }
        assert_eq!(world.store.completion_writes(), 4);
    }
}
