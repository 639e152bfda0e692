//! Flowmind GPU training server.
//!
//! Accepts training jobs over HTTP, runs them in the background against a
//! training backend and reports each outcome to the job's callback URL.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flowmind_server::{config::Config, server};
//!
//! # async fn example() -> flowmind_server::error::Result<()> {
//! let config = Arc::new(Config::load(None)?);
//! server::run(config).await?;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod config;
pub mod error;
pub mod executor;
pub mod notifier;
pub mod pool;
pub mod server;

pub use admission::{AcceptedAck, AdmissionError, JobAdmission, ValidationError};
pub use config::Config;
pub use error::{Result, ServerError};
pub use executor::JobExecutor;
pub use notifier::{DeliveryError, DeliveryResult, HttpNotifier, OutcomeNotifier};
pub use pool::{JobPool, PoolError};
pub use server::TrainingServer;
