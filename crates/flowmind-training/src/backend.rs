use crate::error::TrainingResult;
use crate::job::{Hyperparams, JobId, JobRequest};
use crate::layout::TrainingLayout;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Metrics reported by a backend, keyed by the backend's own metric names.
pub type Metrics = BTreeMap<String, serde_json::Value>;

/// Normalized job descriptor handed to a [`TrainingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingInput {
    pub job_id: JobId,
    /// Pretrained checkpoint identifier (e.g., `yolov8n.pt`).
    pub checkpoint: String,
    /// Dataset descriptor path.
    pub dataset_path: PathBuf,
    pub hyperparams: Hyperparams,
    /// Directory the backend writes its run into.
    pub output_dir: PathBuf,
}

impl TrainingInput {
    /// Resolve a request against the layout, creating the output directory.
    pub async fn from_request(request: &JobRequest, layout: &TrainingLayout) -> TrainingResult<Self> {
        Ok(Self {
            job_id: request.job_id,
            checkpoint: TrainingLayout::checkpoint(&request.model),
            dataset_path: layout.dataset_yaml(request.dataset_id, &request.dataset_version),
            hyperparams: request.hyperparams.clone(),
            output_dir: layout.ensure_output_dir(request.job_id).await?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutput {
    /// Path of the best artifact produced by the run.
    pub artifact_path: String,
    pub metrics: Metrics,
}

/// Boundary to the external training backend.
///
/// Calls may run for hours; they are awaited inside the job's own task and
/// never on the admission path.
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    fn id(&self) -> &'static str;

    async fn train(&self, input: &TrainingInput) -> TrainingResult<TrainingOutput>;
}
