//! End-to-end execution of a single accepted job.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use flowmind_training::{
    JobOutcome, JobPhase, JobRequest, TrainingBackend, TrainingError, TrainingInput,
    TrainingLayout, TrainingOutput, TrainingResult,
};
use futures::FutureExt;
use tracing::{info, warn};

use crate::notifier::OutcomeNotifier;

/// Runs a job: train, build the outcome, notify.
///
/// Cheap to clone; every clone shares the same backend and notifier.
#[derive(Clone)]
pub struct JobExecutor {
    backend: Arc<dyn TrainingBackend>,
    notifier: Arc<dyn OutcomeNotifier>,
    layout: TrainingLayout,
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("backend", &self.backend.id())
            .field("notifier", &"<OutcomeNotifier>")
            .field("layout", &self.layout)
            .finish()
    }
}

impl JobExecutor {
    #[must_use]
    pub fn new(
        backend: Arc<dyn TrainingBackend>,
        notifier: Arc<dyn OutcomeNotifier>,
        layout: TrainingLayout,
    ) -> Self {
        Self { backend, notifier, layout }
    }

    /// Execute `request` to completion.
    ///
    /// Training errors and backend panics become a `FAILED` outcome. The
    /// notifier is called exactly once either way, and its result does not
    /// change the returned outcome.
    pub async fn execute(&self, request: JobRequest) -> JobOutcome {
        let job_id = request.job_id;
        info!(
            job_id = %job_id,
            phase = %JobPhase::Running,
            backend = self.backend.id(),
            "Training started"
        );

        let outcome = match self.train(&request).await {
            Ok(output) => JobOutcome::success(job_id, output.artifact_path, output.metrics),
            Err(e) => {
                warn!(job_id = %job_id, error_kind = e.kind(), error = %e, "Training failed");
                JobOutcome::failure(job_id, &e)
            }
        };
        info!(job_id = %job_id, phase = %outcome.phase(), "Training finished");

        let delivery = self.notifier.notify(&request.callback_url, &outcome).await;
        info!(
            job_id = %job_id,
            phase = %JobPhase::Notified,
            delivered = delivery.is_ok(),
            "Job complete"
        );

        outcome
    }

    async fn train(&self, request: &JobRequest) -> TrainingResult<TrainingOutput> {
        let input = TrainingInput::from_request(request, &self.layout).await?;

        let output = AssertUnwindSafe(self.backend.train(&input))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TrainingError::Panic(panic_message(panic.as_ref()))))?;

        if output.artifact_path.trim().is_empty() {
            return Err(TrainingError::Artifact("backend reported an empty artifact path".to_string()));
        }
        Ok(output)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
