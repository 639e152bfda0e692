//! Shared helpers for training server integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flowmind_server::{config::Config, server};
use flowmind_training::{TrainingBackend, TrainingInput, TrainingOutput, TrainingResult};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Backend whose result is computed by a closure, counting invocations.
pub struct FnBackend<F> {
    f: F,
    pub calls: AtomicUsize,
}

impl<F> FnBackend<F>
where
    F: Fn(&TrainingInput) -> TrainingResult<TrainingOutput> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self { f, calls: AtomicUsize::new(0) })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> TrainingBackend for FnBackend<F>
where
    F: Fn(&TrainingInput) -> TrainingResult<TrainingOutput> + Send + Sync + 'static,
{
    fn id(&self) -> &'static str {
        "fn"
    }

    async fn train(&self, input: &TrainingInput) -> TrainingResult<TrainingOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(input)
    }
}

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
    _dirs: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn start_job(&self, body: &Value) -> reqwest::Response {
        self.client.post(self.url("/train/start")).json(body).send().await.expect("request failed")
    }

    pub async fn health(&self) -> reqwest::Response {
        self.client.get(self.url("/health")).send().await.expect("request failed")
    }
}

/// Start a server with the given backend and pool sizing.
pub async fn start_server(
    backend: Arc<dyn TrainingBackend>,
    max_concurrent_jobs: usize,
    max_queued_jobs: usize,
) -> TestServer {
    let dirs = TempDir::new().unwrap();
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        dataset_root: dirs.path().join("datasets"),
        model_root: dirs.path().join("models"),
        callback_timeout_secs: 2,
        max_concurrent_jobs,
        max_queued_jobs,
        ..Config::default()
    };

    let admission = server::build_admission(&config, backend).unwrap();
    let server = server::TrainingServer::bind(config.bind_address, admission).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server
            .serve(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("server failed");
    });

    TestServer { addr, client: reqwest::Client::new(), _shutdown: shutdown_tx, _dirs: dirs }
}

/// A job request body in the upstream wire format.
pub fn job_body(job_id: i64, epochs: i64, callback_url: &str) -> Value {
    json!({
        "jobId": job_id,
        "datasetId": 11,
        "datasetVersion": "v1",
        "model": {"type": "object-detection", "base": "yolov8", "size": "n"},
        "hyperparams": {"epochs": epochs, "batchSize": 16, "learningRate": 0.01, "optimizer": "SGD"},
        "callbackUrl": callback_url
    })
}

/// Poll until `check` passes or five seconds elapse.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}

/// A URL nothing is listening on.
pub fn unreachable_callback_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/cb")
}
