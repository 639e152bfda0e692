//! Job admission: validate, schedule, acknowledge.
//!
//! Admission never waits on training. A request either fails validation, is
//! rejected because the pool is full, or gets exactly one execution task.
//! Repeated `jobId`s are not deduplicated; each submission runs on its own.

use flowmind_training::{JobId, JobPhase, JobRequest};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::executor::JobExecutor;
use crate::pool::{JobPool, PoolError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("epochs must be > 0 (got {0})")]
    InvalidEpochs(i64),

    #[error("callbackUrl must be an absolute http(s) URL, got {url:?}: {reason}")]
    InvalidCallbackUrl { url: String, reason: String },

    #[error("invalid request body: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Saturated(#[from] PoolError),
}

/// Acknowledgement returned once a job is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedAck {
    pub message: String,
    pub job_id: JobId,
}

impl AcceptedAck {
    fn started(job_id: JobId) -> Self {
        Self { message: "training started".to_string(), job_id }
    }
}

/// Check the constraints the request schema cannot express.
pub fn validate(request: &JobRequest) -> Result<(), ValidationError> {
    if request.hyperparams.epochs <= 0 {
        return Err(ValidationError::InvalidEpochs(request.hyperparams.epochs));
    }
    validate_callback_url(&request.callback_url)?;
    Ok(())
}

fn validate_callback_url(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidCallbackUrl { url: raw.to_string(), reason };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Public entry point for training jobs.
#[derive(Debug, Clone)]
pub struct JobAdmission {
    executor: JobExecutor,
    pool: JobPool,
}

impl JobAdmission {
    #[must_use]
    pub fn new(executor: JobExecutor, pool: JobPool) -> Self {
        Self { executor, pool }
    }

    #[must_use]
    pub fn pool(&self) -> &JobPool {
        &self.pool
    }

    /// Decode a JSON body and submit it.
    pub fn submit_json(&self, body: &[u8]) -> Result<AcceptedAck, AdmissionError> {
        let request: JobRequest =
            serde_json::from_slice(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        self.submit(request)
    }

    /// Validate `request` and schedule it for background execution.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: JobRequest) -> Result<AcceptedAck, AdmissionError> {
        let job_id = request.job_id;
        if let Err(e) = validate(&request) {
            warn!(job_id = %job_id, error = %e, "Rejected training job");
            return Err(e.into());
        }

        let executor = self.executor.clone();
        let spawned = self.pool.try_spawn(job_id, async move {
            executor.execute(request).await;
        });
        if let Err(e) = spawned {
            warn!(job_id = %job_id, error = %e, "Training capacity exhausted");
            return Err(e.into());
        }

        info!(
            job_id = %job_id,
            phase = %JobPhase::Accepted,
            in_flight = self.pool.in_flight(),
            capacity = self.pool.capacity(),
            "Training job accepted"
        );
        Ok(AcceptedAck::started(job_id))
    }
}
