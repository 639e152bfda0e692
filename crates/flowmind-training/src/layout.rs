use crate::error::TrainingResult;
use crate::job::{JobId, ModelSpec};
use std::path::PathBuf;

/// Filesystem conventions shared with the upstream service.
///
/// Datasets live at `<dataset_root>/<dataset_id>/<version>/data.yaml` and
/// training output goes to `<model_root>/yolo/job-<job_id>/`.
#[derive(Debug, Clone)]
pub struct TrainingLayout {
    dataset_root: PathBuf,
    model_root: PathBuf,
}

impl TrainingLayout {
    #[must_use]
    pub fn new(dataset_root: PathBuf, model_root: PathBuf) -> Self {
        Self { dataset_root, model_root }
    }

    /// Pretrained checkpoint name, e.g. `yolov8` + `n` -> `yolov8n.pt`.
    #[must_use]
    pub fn checkpoint(model: &ModelSpec) -> String {
        format!("{}{}.pt", model.base, model.size)
    }

    #[must_use]
    pub fn dataset_yaml(&self, dataset_id: i64, dataset_version: &str) -> PathBuf {
        self.dataset_root.join(dataset_id.to_string()).join(dataset_version).join("data.yaml")
    }

    #[must_use]
    pub fn output_dir(&self, job_id: JobId) -> PathBuf {
        self.model_root.join("yolo").join(format!("job-{job_id}"))
    }

    pub async fn ensure_output_dir(&self, job_id: JobId) -> TrainingResult<PathBuf> {
        let dir = self.output_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}
