//! HTTP transport for the prediction API
//!
//! Routes requests to the `PredictionHandler`, decodes JSON bodies and maps
//! handler errors onto status codes. Uses hyper for the HTTP server.

use crate::domain::types::{ErrorResponse, PassengerFeatures};
use crate::io::prometheus::{self, format_prometheus_metrics};
use crate::services::prediction::{HandlerError, PredictionHandler};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const APPLICATION_JSON: &str = "application/json";

/// Everything a connection task needs to answer requests
#[derive(Clone)]
pub struct ApiState {
    handler: Arc<PredictionHandler>,
    metrics_enabled: bool,
}

impl ApiState {
    pub fn new(handler: Arc<PredictionHandler>, metrics_enabled: bool) -> Self {
        Self { handler, metrics_enabled }
    }
}

fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => response(status, APPLICATION_JSON, bytes),
        Err(e) => {
            error!(error = %e, "response_serialize_failed");
            response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "Internal Server Error")
        }
    }
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response<Full<Bytes>> {
    json_response(status, &ErrorResponse::new(detail))
}

fn handler_error_response(e: &HandlerError) -> Response<Full<Bytes>> {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Read the whole body, refusing anything over `MAX_BODY_BYTES`
async fn read_body<B>(body: B) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {MAX_BODY_BYTES} bytes"),
        )),
        Err(e) => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("could not read request body: {e}"),
        )),
    }
}

async fn predict<B>(body: B, state: &ApiState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    // Structural validation: missing fields or wrong primitive kinds never
    // reach the handler
    let features: PassengerFeatures = match serde_json::from_slice(&bytes) {
        Ok(features) => features,
        Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };

    match state.handler.handle_predict(features).await {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => handler_error_response(&e),
    }
}

async fn health(state: &ApiState) -> Response<Full<Bytes>> {
    match state.handler.store().count().await {
        Ok(count) => {
            json_response(StatusCode::OK, &json!({ "status": "ok", "logged_predictions": count }))
        }
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({ "status": "unavailable", "detail": e.to_string() }),
        ),
    }
}

/// Handle HTTP requests
pub async fn handle_request<B>(
    req: Request<B>,
    state: ApiState,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let start = Instant::now();
    state.handler.metrics().record_request();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") => json_response(StatusCode::OK, &state.handler.handle_root()),
        (&Method::POST, "/predict") => predict(req.into_body(), &state).await,
        (&Method::GET, "/logs") => match state.handler.handle_logs().await {
            Ok(body) => json_response(StatusCode::OK, &body),
            Err(e) => handler_error_response(&e),
        },
        (&Method::GET, "/health") => health(&state).await,
        (&Method::GET, "/metrics") if state.metrics_enabled => response(
            StatusCode::OK,
            prometheus::CONTENT_TYPE,
            format_prometheus_metrics(state.handler.metrics()),
        ),
        (_, "/" | "/predict" | "/logs" | "/health") => {
            error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        (_, "/metrics") if state.metrics_enabled => {
            error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        _ => error_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    debug!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        latency_us = %start.elapsed().as_micros(),
        "http_request"
    );
    Ok(response)
}

/// Bind the listening socket
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Accept connections until the shutdown signal flips to `true`
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, metrics = %state.metrics_enabled, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Model, ModelError};
    use crate::domain::types::{LogsResponse, PredictResponse, StatusResponse};
    use crate::infra::metrics::Metrics;
    use crate::io::store::LogStore;
    use hyper::body::Frame;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::{tempdir, TempDir};

    struct FixedModel;

    impl Model for FixedModel {
        fn predict(&self, _features: &PassengerFeatures) -> Result<i64, ModelError> {
            Ok(0)
        }

        fn predict_probability(&self, _features: &PassengerFeatures) -> Result<f64, ModelError> {
            Ok(0.123456)
        }
    }

    async fn test_state(metrics_enabled: bool) -> (ApiState, TempDir) {
        let dir = tempdir().unwrap();
        let handler = PredictionHandler::initialize_with_model(
            Arc::new(FixedModel),
            LogStore::new(dir.path().join("logs.db")),
            Arc::new(Metrics::new()),
        )
        .await
        .unwrap();
        (ApiState::new(Arc::new(handler), metrics_enabled), dir)
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn send(state: &ApiState, req: Request<Full<Bytes>>) -> (StatusCode, Bytes) {
        let response = handle_request(req, state.clone()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn test_root() {
        let (state, _dir) = test_state(true).await;
        let (status, body) = send(&state, request(Method::GET, "/", "")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.status, "running");
    }

    #[tokio::test]
    async fn test_predict_then_logs() {
        let (state, _dir) = test_state(true).await;
        let (status, body) = send(
            &state,
            request(Method::POST, "/predict", r#"{"pclass": 3, "age": 22.0, "fare": 7.25}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let parsed: PredictResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.survived_prediction, 0);
        assert_eq!(parsed.survival_probability, 0.1235);
        assert_eq!(parsed.log_status, "Saved to Database");

        let (status, body) = send(&state, request(Method::GET, "/logs", "")).await;
        assert_eq!(status, StatusCode::OK);
        let logs: LogsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(logs.recent_logs.len(), 1);
        assert_eq!(logs.recent_logs[0].class(), 3);
    }

    #[tokio::test]
    async fn test_predict_malformed_body_is_422() {
        let (state, _dir) = test_state(true).await;
        for body in [
            "not json",
            r#"{"pclass": 3, "age": 22.0}"#,
            r#"{"pclass": "3", "age": 22.0, "fare": 7.25}"#,
        ] {
            let (status, body) = send(&state, request(Method::POST, "/predict", body)).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
            assert!(!parsed.detail.is_empty());
        }
        assert_eq!(state.handler.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_predict_oversized_body_is_413() {
        let (state, _dir) = test_state(true).await;
        let big = " ".repeat(MAX_BODY_BYTES + 1);
        let (status, _) = send(&state, request(Method::POST, "/predict", &big)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let (state, _dir) = test_state(true).await;
        let (status, _) = send(&state, request(Method::GET, "/nope", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, request(Method::GET, "/predict", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.detail, "Method Not Allowed");

        let (status, _) = send(&state, request(Method::POST, "/logs", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_toggle() {
        let (state, _dir) = test_state(true).await;
        let (status, body) = send(&state, request(Method::GET, "/metrics", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&body).contains("titanic_http_requests_total 1"));

        let (state, _dir) = test_state(false).await;
        let (status, _) = send(&state, request(Method::GET, "/metrics", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_row_count() {
        let (state, _dir) = test_state(true).await;
        let (status, body) = send(&state, request(Method::GET, "/health", "")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["logged_predictions"], 0);
    }

    #[tokio::test]
    async fn test_health_unavailable_when_store_cannot_open() {
        // The store path is a directory, so every connection attempt fails
        let dir = tempdir().unwrap();
        let handler = PredictionHandler::new(
            Arc::new(FixedModel),
            LogStore::new(dir.path()),
            Arc::new(Metrics::new()),
        );
        let state = ApiState::new(Arc::new(handler), true);

        let (status, body) = send(&state, request(Method::GET, "/health", "")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "unavailable");
        assert!(parsed["detail"].is_string());
    }

    /// Request body whose stream fails on the first poll
    struct ResetBody;

    impl Body for ResetBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(Some(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))))
        }
    }

    #[tokio::test]
    async fn test_predict_body_read_error_is_400() {
        let (state, _dir) = test_state(true).await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .body(ResetBody)
            .unwrap();

        let response = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["detail"].as_str().unwrap().starts_with("could not read request body"));

        let (_, body) = send(&state, request(Method::GET, "/logs", "")).await;
        let logs: LogsResponse = serde_json::from_slice(&body).unwrap();
        assert!(logs.recent_logs.is_empty());
    }
}
