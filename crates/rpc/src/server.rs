use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use custody_core::{CustodyError, CustodyTracker};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::custody;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<CustodyTracker>,
    pub start_time: Instant,
    pub node_id: String,
    pub metrics: Option<PrometheusHandle>,
    pub req_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(tracker: Arc<CustodyTracker>, node_id: impl Into<String>) -> Self {
        Self {
            tracker,
            start_time: Instant::now(),
            node_id: node_id.into(),
            metrics: None,
            req_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    pub(crate) fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

/// Success body: `{"ok": true, "value": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    ok: bool,
    value: T,
}

pub(crate) fn ok<T: Serialize>(value: T) -> Json<Envelope<T>> {
    Json(Envelope { ok: true, value })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// Failure body: `{"ok": false, "error": {"message": ...}}`.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CustodyError> for ApiError {
    fn from(err: CustodyError) -> Self {
        match err {
            CustodyError::NotFound { .. } => ApiError::not_found(err.to_string()),
            CustodyError::InvalidTransition { .. } => ApiError::conflict(err.to_string()),
            CustodyError::Storage(_) => {
                error!("custody store failure: {}", err);
                ApiError::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            ok: false,
            error: ErrorBody {
                message: self.message,
            },
        });
        (self.status, payload).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    version: &'static str,
    commit: &'static str,
    uptime_secs: u64,
    req_total: u64,
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let app = build_router(Arc::new(state));
    let listener = bind_listener(addr).await?;
    info!("custody RPC listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .await
        .context("RPC server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route(
            "/api/:cid",
            get(custody::handle_status).delete(custody::handle_delete),
        )
        .route("/api/:cid/structure", get(custody::handle_structure))
        .route("/api/:cid/backups", get(custody::handle_backups))
        .route("/ingest/deals", post(custody::handle_ingest_deal))
        .route("/ingest/pins", post(custody::handle_ingest_pin))
        .route("/ingest/claims", post(custody::handle_ingest_claim))
        .route("/ingest/backups", post(custody::handle_ingest_backup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    Json(HealthResponse {
        status: "ok",
        node_id: state.node_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_HASH").unwrap_or("unknown"),
        uptime_secs: state.uptime_seconds(),
        req_total,
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let req_total = state.record_request();
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("metrics exporter is disabled"))?;

    let mut metrics = handle.render();
    metrics.push_str("# HELP custody_http_requests_total Total number of RPC requests handled\n");
    metrics.push_str("# TYPE custody_http_requests_total counter\n");
    metrics.push_str(&format!("custody_http_requests_total {req_total}\n"));
    metrics.push_str("# HELP custody_uptime_seconds Uptime of the service in seconds\n");
    metrics.push_str("# TYPE custody_uptime_seconds gauge\n");
    metrics.push_str(&format!("custody_uptime_seconds {}\n", state.uptime_seconds()));

    let mut response = Response::new(Body::from(metrics));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    Ok(response)
}
