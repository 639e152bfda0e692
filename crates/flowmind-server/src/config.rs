//! Configuration for the training server.
//!
//! Built once at startup from defaults, an optional TOML file and environment
//! variables (later sources win), then shared read-only behind an `Arc`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use flowmind_training::TrainingLayout;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::error::{Result, ServerError};

/// Config file looked up in the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "flowmind";

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    /// Root of versioned datasets (`<root>/<dataset_id>/<version>/data.yaml`).
    #[serde(default = "default_dataset_root")]
    pub dataset_root: PathBuf,
    /// Root of training output.
    #[serde(default = "default_model_root")]
    pub model_root: PathBuf,
    /// Shared secret sent with outcome callbacks. Empty disables the header.
    #[serde(default = "default_backend_api_key")]
    pub backend_api_key: String,
    /// Hard timeout for a single callback POST.
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
    /// Jobs allowed to train at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Accepted jobs allowed to wait for a training slot.
    #[serde(default = "default_max_queued_jobs")]
    pub max_queued_jobs: usize,
    /// Trainer executable.
    #[serde(default = "default_trainer_program")]
    pub trainer_program: String,
    /// Arguments placed before the job arguments.
    #[serde(default = "default_trainer_args")]
    pub trainer_args: Vec<String>,
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_dataset_root() -> PathBuf {
    PathBuf::from("/data/datasets")
}

fn default_model_root() -> PathBuf {
    PathBuf::from("/data/models")
}

fn default_backend_api_key() -> String {
    "CHANGE_ME".to_string()
}

fn default_callback_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_max_queued_jobs() -> usize {
    16
}

fn default_trainer_program() -> String {
    "yolo".to_string()
}

fn default_trainer_args() -> Vec<String> {
    vec!["train".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            dataset_root: default_dataset_root(),
            model_root: default_model_root(),
            backend_api_key: default_backend_api_key(),
            callback_timeout_secs: default_callback_timeout_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_queued_jobs: default_max_queued_jobs(),
            trainer_program: default_trainer_program(),
            trainer_args: default_trainer_args(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file and the process environment.
    ///
    /// Environment variables are unprefixed (`DATASET_ROOT`, `MODEL_ROOT`,
    /// `BACKEND_API_KEY`, `MAX_CONCURRENT_JOBS`, ...). `TRAINER_ARGS` is split on spaces.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, a value has the wrong
    /// type, or the resulting settings fail [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = config::Config::builder().add_source(file).add_source(environment());
        Self::build(builder)
    }

    pub(crate) fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(ServerError::Config("max_concurrent_jobs must be >= 1".to_string()));
        }
        let capacity = self.max_concurrent_jobs.checked_add(self.max_queued_jobs);
        if capacity.is_none_or(|c| c > Semaphore::MAX_PERMITS) {
            return Err(ServerError::Config(format!(
                "max_concurrent_jobs + max_queued_jobs must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.callback_timeout_secs == 0 {
            return Err(ServerError::Config("callback_timeout_secs must be >= 1".to_string()));
        }
        if self.trainer_program.trim().is_empty() {
            return Err(ServerError::Config("trainer_program is required".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> TrainingLayout {
        TrainingLayout::new(self.dataset_root.clone(), self.model_root.clone())
    }

    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    /// The callback shared secret, if one is configured.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        let key = self.backend_api_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

fn environment() -> Environment {
    Environment::default()
        .try_parsing(true)
        .list_separator(" ")
        .with_list_parse_key("trainer_args")
}
