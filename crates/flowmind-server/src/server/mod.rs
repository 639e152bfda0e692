//! HTTP server for the training job API.
//!
//! Routes:
//! - `POST /train/start`: submit a training job
//! - `GET /health`: liveness probe

pub mod handlers;
pub mod logging;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use flowmind_training::{CommandBackend, TrainingBackend};
use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceBuilder;
use tracing::{debug, error, info, warn};

use crate::admission::JobAdmission;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::executor::JobExecutor;
use crate::notifier::{HttpNotifier, OutcomeNotifier};
use crate::pool::JobPool;
use logging::RequestLoggerLayer;

/// Wire the admission service from configuration and a training backend.
///
/// # Errors
///
/// Returns an error if the callback HTTP client cannot be created.
pub fn build_admission(config: &Config, backend: Arc<dyn TrainingBackend>) -> Result<JobAdmission> {
    let notifier: Arc<dyn OutcomeNotifier> =
        Arc::new(HttpNotifier::new(config.callback_timeout(), config.api_key().map(str::to_string))?);
    let executor = JobExecutor::new(backend, notifier, config.layout());
    let pool = JobPool::new(config.max_concurrent_jobs, config.max_queued_jobs);
    Ok(JobAdmission::new(executor, pool))
}

/// A bound HTTP server, ready to serve.
#[derive(Debug)]
pub struct TrainingServer {
    listener: TcpListener,
    admission: JobAdmission,
}

impl TrainingServer {
    /// Bind the listener. Port 0 picks a free port; see [`TrainingServer::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, admission: JobAdmission) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { listener, admission })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Jobs still running at shutdown are not awaited.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.local_addr()?;
        info!(%addr, "Training server listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "New connection");
                            let admission = self.admission.clone();
                            tokio::spawn(async move {
                                Self::handle_connection(stream, admission).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        let in_flight = self.admission.pool().in_flight();
        if in_flight > 0 {
            warn!(in_flight, "Shutting down with training jobs still in flight");
        }
        Ok(())
    }

    /// Serve one HTTP/1.1 connection.
    async fn handle_connection(stream: TcpStream, admission: JobAdmission) {
        let service = ServiceBuilder::new().layer(RequestLoggerLayer).service(tower::service_fn(
            move |req: Request<Incoming>| handlers::route(req, admission.clone()),
        ));

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
            .await
        {
            debug!(error = %e, "Error serving connection");
        }
    }
}

/// Start the training server with the subprocess backend and run until ctrl-c.
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the configured address.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let backend = Arc::new(CommandBackend::new(config.trainer_program.clone(), config.trainer_args.clone()));
    let admission = build_admission(&config, backend)?;

    info!(
        bind_address = %config.bind_address,
        dataset_root = %config.dataset_root.display(),
        model_root = %config.model_root.display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        max_queued_jobs = config.max_queued_jobs,
        trainer = %config.trainer_program,
        "Starting training server"
    );

    let server = TrainingServer::bind(config.bind_address, admission).await?;
    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
