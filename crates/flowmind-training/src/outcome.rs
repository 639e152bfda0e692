use crate::backend::Metrics;
use crate::error::TrainingError;
use crate::job::JobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Success,
    Failed,
}

/// Lifecycle of a single job: `Accepted → Running → (Succeeded | Failed) → Notified`.
///
/// `Notified` is terminal whether or not the callback was actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Accepted,
    Running,
    Succeeded,
    Failed,
    Notified,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accepted => "accepted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Notified => "notified",
        };
        f.write_str(s)
    }
}

/// Terminal record of a job, posted to the job's callback URL.
///
/// Built only through [`JobOutcome::success`] and [`JobOutcome::failure`]:
/// `result_model_path` is set iff the job succeeded, `error_message` iff it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result_model_path: Option<String>,
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl JobOutcome {
    #[must_use]
    pub fn success(job_id: JobId, result_model_path: String, metrics: Metrics) -> Self {
        Self {
            job_id,
            status: JobStatus::Success,
            result_model_path: Some(result_model_path),
            error_message: None,
            metrics: (!metrics.is_empty()).then_some(metrics),
        }
    }

    #[must_use]
    pub fn failure(job_id: JobId, error: &TrainingError) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            result_model_path: None,
            error_message: Some(error.describe()),
            metrics: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> JobPhase {
        match self.status {
            JobStatus::Success => JobPhase::Succeeded,
            JobStatus::Failed => JobPhase::Failed,
        }
    }
}
