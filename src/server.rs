//! HTTP boundary
//!
//! | Method | Path       | Description                                  |
//! |--------|------------|----------------------------------------------|
//! | POST   | `/query`   | Fan a read query out, stream merged CSV back |
//! | GET    | `/metrics` | Process counters as JSON                     |
//!
//! Every request-level rejection happens before the response starts, so the
//! status code is final once the CSV body begins streaming.

use std::future::Future;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{AuthKeys, Config};
use crate::engine::{DriverRegistry, Gateway, QueryRequest, RequestError};
use crate::export::CsvSink;
use crate::metrics;

/// Buffer between the coordinator and the response body
const STREAM_BUFFER_BYTES: usize = 64 * 1024;

/// Shared, immutable request handler state
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    auth: Arc<AuthKeys>,
}

impl AppState {
    pub fn new(gateway: Gateway, auth: AuthKeys) -> Self {
        Self {
            gateway: Arc::new(gateway),
            auth: Arc::new(auth),
        }
    }

    /// Gateway over the configured hosts with the built-in drivers.
    pub fn from_config(config: &Config) -> Self {
        let gateway = Gateway::new(
            config.host_registry(),
            DriverRegistry::with_defaults(),
            config.gateway_options(),
        );
        Self::new(gateway, config.auth_keys())
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Request rejection rendered as `{"error": ...}`
pub struct ApiError(RequestError);

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_auth() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::BAD_REQUEST
        };
        metrics::record_rejected();
        debug!(status = status.as_u16(), error = %self.0, "request rejected");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn query(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: QueryRequest = serde_json::from_slice(&body)
        .map_err(|e| RequestError::malformed(e.to_string()))?;

    if !state.auth.is_authorized(request.auth_key.expose()) {
        return Err(RequestError::Unauthorized.into());
    }

    let prepared = state.gateway.prepare(&request)?;
    let request_id = prepared.request_id();
    info!(
        %request_id,
        hosts = ?prepared.host_names(),
        timeout_ms = prepared.timeout().as_millis() as u64,
        "query accepted"
    );

    let (writer, reader) = tokio::io::duplex(STREAM_BUFFER_BYTES);
    let gateway = Arc::clone(&state.gateway);
    tokio::spawn(
        async move {
            let mut sink = CsvSink::new(writer);
            match gateway.run(prepared, &mut sink).await {
                Ok(summary) => debug!(bytes = sink.bytes_written(), failed = summary.hosts_failed(), "response complete"),
                Err(e) if e.is_disconnect() => info!("client went away, fan-out stopped"),
                Err(e) => warn!(error = %e, "response aborted"),
            }
        }
        .instrument(info_span!("fanout", %request_id)),
    );

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (HeaderName::from_static("x-request-id"), request_id.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(reader))).into_response())
}

async fn get_metrics() -> Json<metrics::MetricsSnapshot> {
    Json(metrics::snapshot())
}
