//! HTTP request handlers: OTLP ingestion and the REST query surface (§6).

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cardinality_core::entities::{CatalogScope, SignalType};
use cardinality_core::query::{AttributeFilter, AttributeSort, LogView, MetricView, PatternFilter, SpanView};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::transport::{parse_request, InputFormat};
use crate::{AppError, AppState};

const MAX_PAYLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Copy, Clone, Debug)]
enum Signal {
    Logs,
    Traces,
    Metrics,
}

impl Signal {
    fn as_str(self) -> &'static str {
        match self {
            Signal::Logs => "logs",
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
        }
    }
}

pub async fn handle_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    handle_ingest(Signal::Logs, &state, headers, body).await
}

pub async fn handle_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    handle_ingest(Signal::Traces, &state, headers, body).await
}

pub async fn handle_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    handle_ingest(Signal::Metrics, &state, headers, body).await
}

async fn handle_ingest(
    signal: Signal,
    state: &AppState,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    let format = InputFormat::from_content_type(content_type);

    debug!(
        signal = signal.as_str(),
        bytes = body.len(),
        ?format,
        "received OTLP ingest request"
    );

    if body.len() > MAX_PAYLOAD_BYTES {
        return Err(AppError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            anyhow::anyhow!("payload {} exceeds limit {}", body.len(), MAX_PAYLOAD_BYTES),
        ));
    }

    let start = Instant::now();
    let updated = match signal {
        Signal::Logs => {
            let request: ExportLogsServiceRequest = parse_request(&body, format)
                .map_err(|e| AppError::bad_request(e.context("failed to parse OTLP logs payload")))?;
            state.analyzer.ingest_logs(&request)?
        }
        Signal::Traces => {
            let request: ExportTraceServiceRequest = parse_request(&body, format)
                .map_err(|e| AppError::bad_request(e.context("failed to parse OTLP traces payload")))?;
            state.analyzer.ingest_traces(&request)?
        }
        Signal::Metrics => {
            let request: ExportMetricsServiceRequest = parse_request(&body, format)
                .map_err(|e| AppError::bad_request(e.context("failed to parse OTLP metrics payload")))?;
            state.analyzer.ingest_metrics(&request)?
        }
    };

    info!(
        signal = signal.as_str(),
        updated,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "folded OTLP records into catalog"
    );

    Ok((StatusCode::OK, Json(json!({ "status": "ok", "entities_updated": updated }))).into_response())
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.analyzer.is_closed() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "closed" })));
    }
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ServiceScopedQuery {
    service: Option<String>,
}

pub async fn list_metrics(
    State(state): State<AppState>,
    Query(q): Query<ServiceScopedQuery>,
) -> Result<Response, AppError> {
    let cancel = CancellationToken::new();
    let metrics = state.analyzer.list_metrics(q.service.as_deref(), &cancel)?;
    let views: Vec<_> = metrics.iter().map(MetricView::from).collect();
    Ok(Json(json!({ "metrics": views, "total": views.len() })).into_response())
}

pub async fn get_metric(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    let metric = state.analyzer.get_metric(&name)?;
    Ok(Json(MetricView::from(&metric)).into_response())
}

pub async fn list_spans(
    State(state): State<AppState>,
    Query(q): Query<ServiceScopedQuery>,
) -> Result<Response, AppError> {
    let cancel = CancellationToken::new();
    let spans = state.analyzer.list_spans(q.service.as_deref(), &cancel)?;
    let views: Vec<_> = spans.iter().map(SpanView::from).collect();
    Ok(Json(json!({ "spans": views, "total": views.len() })).into_response())
}

pub async fn get_span(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, AppError> {
    let span = state.analyzer.get_span(&name)?;
    Ok(Json(SpanView::from(&span)).into_response())
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(q): Query<ServiceScopedQuery>,
) -> Result<Response, AppError> {
    let cancel = CancellationToken::new();
    let logs = state.analyzer.list_logs(q.service.as_deref(), &cancel)?;
    let views: Vec<_> = logs.iter().map(LogView::from).collect();
    Ok(Json(json!({ "logs": views, "total": views.len() })).into_response())
}

pub async fn get_log(State(state): State<AppState>, Path(severity_text): Path<String>) -> Result<Response, AppError> {
    let log = state.analyzer.get_log(&severity_text)?;
    Ok(Json(LogView::from(&log)).into_response())
}

#[derive(Debug, Deserialize, Default)]
pub struct AttributeQuery {
    signal_type: Option<SignalType>,
    scope: Option<CatalogScope>,
    min_cardinality: Option<u64>,
    sort: Option<String>,
    descending: Option<bool>,
    limit: Option<usize>,
    offset: Option<usize>,
}

fn parse_sort(sort: Option<&str>) -> AttributeSort {
    match sort {
        Some("count") => AttributeSort::Count,
        Some("last_seen") => AttributeSort::LastSeen,
        Some("cardinality") => AttributeSort::Cardinality,
        _ => AttributeSort::Key,
    }
}

pub async fn list_attributes(
    State(state): State<AppState>,
    Query(q): Query<AttributeQuery>,
) -> Result<Response, AppError> {
    let filter = AttributeFilter {
        signal_type: q.signal_type,
        scope: q.scope,
        min_cardinality: q.min_cardinality,
        sort: Some(parse_sort(q.sort.as_deref())),
        descending: q.descending.unwrap_or(false),
        limit: q.limit,
        offset: q.offset.unwrap_or(0),
    };
    let cancel = CancellationToken::new();
    let attributes = state.analyzer.list_attributes(&filter, &cancel)?;
    Ok(Json(json!({ "attributes": attributes, "total": attributes.len() })).into_response())
}

pub async fn get_attribute(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, AppError> {
    let attribute = state.analyzer.get_attribute(&key)?;
    Ok(Json(attribute).into_response())
}

pub async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    let services = state.analyzer.list_services();
    Json(json!({ "services": services, "total": services.len() }))
}

pub async fn get_service_overview(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let cancel = CancellationToken::new();
    let overview = state.analyzer.get_service_overview(&name, &cancel)?;
    Ok(Json(overview).into_response())
}

#[derive(Debug, Deserialize, Default)]
pub struct PatternQuery {
    min_count: Option<u64>,
    min_services: Option<usize>,
}

pub async fn explore_patterns(
    State(state): State<AppState>,
    Query(q): Query<PatternQuery>,
) -> Result<Response, AppError> {
    let filter = PatternFilter {
        min_count: q.min_count,
        min_services: q.min_services,
    };
    let cancel = CancellationToken::new();
    let patterns = state.analyzer.explore_patterns(&filter, &cancel)?;
    Ok(Json(json!({ "patterns": patterns, "total": patterns.len() })).into_response())
}

pub async fn admin_clear(State(state): State<AppState>) -> impl IntoResponse {
    state.analyzer.clear();
    info!("catalog cleared via admin endpoint");
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
