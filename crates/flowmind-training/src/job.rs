use serde::{Deserialize, Serialize};

/// Identifier for a training job, assigned by the upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Checkpoint family to start training from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Task type (e.g., "object-detection")
    #[serde(rename = "type")]
    pub kind: String,
    /// Model family (e.g., "yolov8", "yolo11")
    pub base: String,
    /// Size variant (e.g., "n", "s", "m", "l", "x")
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hyperparams {
    /// Signed so that non-positive values reach validation instead of failing to decode.
    pub epochs: i64,
    pub batch_size: i64,
    pub learning_rate: f64,
    /// Passed through to the backend as-is (e.g., "SGD", "Adam").
    pub optimizer: String,
}

/// A training job as submitted to `POST /train/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: JobId,
    pub dataset_id: i64,
    pub dataset_version: String,
    #[serde(rename = "model", alias = "modelSpec")]
    pub model: ModelSpec,
    pub hyperparams: Hyperparams,
    pub callback_url: String,
}
