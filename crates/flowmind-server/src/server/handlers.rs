//! HTTP request handlers.

use std::convert::Infallible;

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use serde::Serialize;
use serde_json::json;

use crate::admission::{AdmissionError, JobAdmission};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Health check payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Dispatch a request to its handler.
pub async fn route<B>(
    req: Request<B>,
    admission: JobAdmission,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => health(),
        (&Method::POST, "/train/start") => start_training(req, &admission).await,
        (_, "/health" | "/train/start") => {
            json_response(StatusCode::METHOD_NOT_ALLOWED, &json!({"detail": "Method Not Allowed"}))
        }
        _ => json_response(StatusCode::NOT_FOUND, &json!({"detail": "Not Found"})),
    };
    Ok(response)
}

/// Liveness probe.
pub fn health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &HealthResponse { status: "ok" })
}

/// Accept a training job and run it in the background.
pub async fn start_training<B>(req: Request<B>, admission: &JobAdmission) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"detail": format!("could not read request body: {e}")}),
            );
        }
    };

    match admission.submit_json(&body) {
        Ok(ack) => json_response(StatusCode::OK, &ack),
        Err(AdmissionError::Validation(e)) => {
            json_response(StatusCode::BAD_REQUEST, &json!({"detail": e.to_string()}))
        }
        Err(AdmissionError::Saturated(e)) => {
            json_response(StatusCode::SERVICE_UNAVAILABLE, &json!({"detail": e.to_string()}))
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
