//! Detached, deadline-bound execution of generation runs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::core::{GenerationRequest, RecordId};
use crate::observability::SpanTimer;

use super::orchestrator::{GenerationOrchestrator, RunReport};

/// How long a cancelled run may take to wind down before it is dropped.
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Called once with the report of every launched run.
pub type CompletionHook = Arc<dyn Fn(RunReport) + Send + Sync>;

/// Spawns one background task per run and enforces its deadline.
#[derive(Clone)]
pub struct GenerationLauncher {
    orchestrator: Arc<GenerationOrchestrator>,
    deadline: Duration,
    hook: Option<CompletionHook>,
}

impl std::fmt::Debug for GenerationLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationLauncher")
            .field("deadline", &self.deadline)
            .field("has_hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl GenerationLauncher {
    /// Creates a launcher.
    #[must_use]
    pub fn new(orchestrator: Arc<GenerationOrchestrator>, deadline: Duration) -> Self {
        Self {
            orchestrator,
            deadline,
            hook: None,
        }
    }

    /// Sets a hook that observes every run's report.
    #[must_use]
    pub fn with_completion_hook(mut self, hook: CompletionHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Returns the per-run deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Returns the orchestrator runs are handed to.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<GenerationOrchestrator> {
        &self.orchestrator
    }

    /// Starts a run for `record` in the background and returns its run id.
    ///
    /// The caller keeps no handle. When the deadline passes the run's token
    /// is cancelled, and a run that has not stopped within [`CANCEL_GRACE`]
    /// is dropped where it stands.
    pub fn launch(&self, record: RecordId, request: GenerationRequest) -> Uuid {
        let run_id = Uuid::new_v4();
        let orchestrator = Arc::clone(&self.orchestrator);
        let deadline = self.deadline;
        let hook = self.hook.clone();
        let span = info_span!("generation_run", %run_id, record_id = %record);

        tokio::spawn(
            async move {
                let timer = SpanTimer::start("run");
                let token = CancellationToken::new();
                let run = orchestrator.run_with_id(run_id, record, &request, &token);
                tokio::pin!(run);

                let report = match tokio::time::timeout(deadline, &mut run).await {
                    Ok(report) => report,
                    Err(_) => {
                        let reason = format!("deadline of {}s elapsed", deadline.as_secs_f64());
                        warn!(reason = %reason, "Cancelling run");
                        token.cancel(reason.clone());
                        match tokio::time::timeout(CANCEL_GRACE, &mut run).await {
                            Ok(report) => report,
                            Err(_) => {
                                warn!("Run ignored cancellation, abandoning");
                                RunReport::abandoned(run_id, record, reason, timer.elapsed_ms())
                            }
                        }
                    }
                };

                if let Some(hook) = hook {
                    hook(report);
                }
            }
            .instrument(span),
        );

        run_id
    }
}
