//! Flowmind Training
//!
//! Backend-agnostic training primitives for the GPU training server:
//! - Describing training jobs as submitted by the upstream service (`JobRequest`)
//! - Reporting job results back to the caller (`JobOutcome`)
//! - Resolving checkpoint, dataset and output paths (`TrainingLayout`)
//! - Implementing training backends (`TrainingBackend`)

pub mod backend;
pub mod command;
pub mod error;
pub mod job;
pub mod layout;
pub mod outcome;

pub use backend::{Metrics, TrainingBackend, TrainingInput, TrainingOutput};
pub use command::CommandBackend;
pub use error::{TrainingError, TrainingResult};
pub use job::{Hyperparams, JobId, JobRequest, ModelSpec};
pub use layout::TrainingLayout;
pub use outcome::{JobOutcome, JobPhase, JobStatus};
