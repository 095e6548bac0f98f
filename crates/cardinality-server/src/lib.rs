//! OTLP HTTP server: ingestion endpoints plus the REST query surface over
//! a [`cardinality_core::Analyzer`].
//!
//! - Axum HTTP server (HTTP/1.1)
//! - Transparent gzip request decompression via `tower_http`
//! - Structured logging with tracing
//! - Graceful shutdown on Ctrl+C / SIGTERM

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cardinality_config::RuntimeConfig;
use cardinality_core::{Analyzer, CoreError};
use serde_json::json;
use tokio::signal;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod handlers;
mod init;
mod transport;

use handlers::{
    admin_clear, explore_patterns, get_attribute, get_log, get_metric, get_service_overview, get_span, handle_logs,
    handle_metrics, handle_traces, health_check, list_attributes, list_logs, list_metrics, list_services, list_spans,
    ready_check,
};
use init::init_tracing;

/// Application state shared across all requests.
#[derive(Clone)]
pub(crate) struct AppState {
    pub analyzer: Arc<Analyzer>,
}

/// Error type that implements `IntoResponse`, mapping `CoreError` variants
/// and transport-local `anyhow::Error`s to HTTP status codes (§7).
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("request error: {:?}", self.error);
        (self.status, Json(json!({ "error": self.error.to_string() }))).into_response()
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(error: anyhow::Error) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, error)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let status = match err {
            CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Malformed(_) => StatusCode::BAD_REQUEST,
            CoreError::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            CoreError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: anyhow::Error::new(err),
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/logs", post(handle_logs).get(list_logs))
        .route("/v1/traces", post(handle_traces))
        .route("/v1/metrics", post(handle_metrics).get(list_metrics))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/metrics/:name", get(get_metric))
        .route("/v1/spans", get(list_spans))
        .route("/v1/spans/:name", get(get_span))
        .route("/v1/logs/:severity_text", get(get_log))
        .route("/v1/attributes", get(list_attributes))
        .route("/v1/attributes/:key", get(get_attribute))
        .route("/v1/services", get(list_services))
        .route("/v1/services/:name", get(get_service_overview))
        .route("/v1/patterns", get(explore_patterns))
        .route("/v1/admin/clear", post(admin_clear))
        .layer(TraceLayer::new_for_http())
        .layer(RequestDecompressionLayer::new().gzip(true))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}

/// Load configuration, build the analyzer, and serve until shutdown.
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("failed to load configuration")?;
    run_with_config(config).await
}

pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let addr = config.server.listen_addr.clone();
    let analyzer = Arc::new(Analyzer::new(config.analyzer.clone()));
    let state = AppState { analyzer };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!("cardinality analyzer listening on http://{addr}");
    info!("  POST http://{addr}/v1/logs         - OTLP log ingestion");
    info!("  POST http://{addr}/v1/traces        - OTLP trace ingestion");
    info!("  POST http://{addr}/v1/metrics       - OTLP metrics ingestion");
    info!("  GET  http://{addr}/v1/services      - list known services");
    info!("  GET  http://{addr}/v1/patterns      - log body pattern explorer");
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server shutdown complete");
    Ok(())
}
