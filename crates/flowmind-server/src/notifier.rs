//! Outcome delivery to the caller's callback URL.
//!
//! Delivery is best effort: one POST, bounded by a timeout, never retried.
//! Failures are logged and returned for inspection, nothing else.

use std::time::Duration;

use async_trait::async_trait;
use flowmind_training::JobOutcome;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::Result;

/// Header carrying the shared secret on callback requests.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("callback timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not connect to callback: {0}")]
    Connect(String),

    #[error("callback responded with HTTP {0}")]
    Status(u16),

    #[error("callback request failed: {0}")]
    Request(String),
}

/// HTTP status of the accepted callback, or why delivery failed.
pub type DeliveryResult = std::result::Result<u16, DeliveryError>;

#[async_trait]
pub trait OutcomeNotifier: Send + Sync {
    async fn notify(&self, callback_url: &str, outcome: &JobOutcome) -> DeliveryResult;
}

/// Posts outcomes as JSON with reqwest.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    timeout: Duration,
    api_key: Option<String>,
}

impl HttpNotifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout: Duration, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout, api_key })
    }

    fn classify(&self, err: &reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else if err.is_connect() {
            DeliveryError::Connect(format!("{err:?}"))
        } else {
            DeliveryError::Request(format!("{err:?}"))
        }
    }
}

#[async_trait]
impl OutcomeNotifier for HttpNotifier {
    async fn notify(&self, callback_url: &str, outcome: &JobOutcome) -> DeliveryResult {
        debug!(job_id = %outcome.job_id, callback_url, "Posting job outcome");

        let mut request = self.client.post(callback_url).json(outcome);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response.status().as_u16()),
            Ok(response) => Err(DeliveryError::Status(response.status().as_u16())),
            Err(e) => Err(self.classify(&e)),
        };

        match &result {
            Ok(status) => {
                info!(job_id = %outcome.job_id, callback_url, status, "Callback delivered");
            }
            Err(e) => {
                error!(
                    job_id = %outcome.job_id,
                    callback_url,
                    outcome_status = ?outcome.status,
                    error = %e,
                    "Callback delivery failed, not retrying"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmind_training::{JobId, Metrics, TrainingError};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn success_outcome() -> JobOutcome {
        JobOutcome::success(JobId(2), "/models/job-2/best.pt".to_string(), Metrics::new())
    }

    /// A port nothing is listening on.
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/cb")
    }

    #[tokio::test]
    async fn test_notify_posts_outcome_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/cb")
            .match_header("content-type", "application/json")
            .match_header(API_KEY_HEADER, "s3cret")
            .match_body(Matcher::Json(json!({
                "jobId": 2,
                "status": "SUCCESS",
                "resultModelPath": "/models/job-2/best.pt",
                "errorMessage": null
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let notifier = HttpNotifier::new(Duration::from_secs(5), Some("s3cret".to_string())).unwrap();
        let url = format!("{}/cb", server.url());
        let result = notifier.notify(&url, &success_outcome()).await;

        assert_eq!(result.unwrap(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_without_api_key_sends_no_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/cb")
            .match_header(API_KEY_HEADER, Matcher::Missing)
            .with_status(204)
            .create_async()
            .await;

        let notifier = HttpNotifier::new(Duration::from_secs(5), None).unwrap();
        let result = notifier.notify(&format!("{}/cb", server.url()), &success_outcome()).await;

        assert_eq!(result.unwrap(), 204);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_non_2xx_is_failure_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/cb").with_status(500).expect(1).create_async().await;

        let notifier = HttpNotifier::new(Duration::from_secs(5), None).unwrap();
        let err = notifier
            .notify(&format!("{}/cb", server.url()), &success_outcome())
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Status(500)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notify_unreachable_is_connect_error() {
        let notifier = HttpNotifier::new(Duration::from_secs(5), None).unwrap();
        let err = notifier.notify(&closed_port_url(), &success_outcome()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Connect(_)));
    }

    #[tokio::test]
    async fn test_notify_times_out() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });

        let notifier = HttpNotifier::new(Duration::from_millis(200), None).unwrap();
        let failure = JobOutcome::failure(JobId(3), &TrainingError::backend("RuntimeError", "disk full"));
        let err = notifier.notify(&format!("http://{addr}/cb"), &failure).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Timeout(d) if d == Duration::from_millis(200)));
    }
}
