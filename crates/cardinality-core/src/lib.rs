//! Cardinality-aware OTLP metadata catalog.
//!
//! Ingests decoded OTLP metrics/traces/logs export requests, extracts their
//! schema (names, attribute keys, attribute values) rather than their
//! payloads, and tracks per-key cardinality with HyperLogLog sketches and a
//! streaming log-template clusterer. Wire decoding (protobuf/JSON, content
//! negotiation) is a transport concern and lives in `cardinality-server`;
//! this crate only ever sees already-decoded `opentelemetry_proto` types.

pub mod aggregator;
pub mod cardinality;
pub mod config;
pub mod entities;
pub mod error;
pub mod otlp;
pub mod query;
pub mod store;
pub mod templates;
pub mod value_canon;

use chrono::Utc;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use tokio_util::sync::CancellationToken;

pub use config::AnalyzerConfig;
pub use error::{CoreError, Result};

use entities::{CatalogScope, LogMetadata, MetricMetadata, SignalType, SpanMetadata};
use query::{AttributeFilter, AttributeView, PatternFilter, PatternGroup, ServiceOverview};
use store::MemoryStore;

/// The cardinality catalog's top-level handle: one ingest API per signal
/// (§6), plus the query API backing the REST layer.
pub struct Analyzer {
    store: MemoryStore,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            store: MemoryStore::new(config),
        }
    }

    // ---- ingest API (§6) ------------------------------------------------

    /// Walk and fold a decoded metrics export request. Returns the number
    /// of data points folded (malformed ones are counted, not fatal).
    pub fn ingest_metrics(&self, request: &ExportMetricsServiceRequest) -> Result<usize> {
        let (records, stats) = otlp::walk_metrics(request);
        if stats.malformed_count > 0 {
            tracing::warn!(malformed = stats.malformed_count, "skipped malformed metric data points");
        }
        self.store.ingest_metrics(&records, Utc::now())
    }

    pub fn ingest_traces(&self, request: &ExportTraceServiceRequest) -> Result<usize> {
        let (records, _stats) = otlp::walk_traces(request);
        self.store.ingest_spans(&records, Utc::now())
    }

    pub fn ingest_logs(&self, request: &ExportLogsServiceRequest) -> Result<usize> {
        let (records, _stats) = otlp::walk_logs(request);
        self.store.ingest_logs(&records, Utc::now())
    }

    // ---- query API (§6, §4.F) -------------------------------------------

    pub fn get_metric(&self, name: &str) -> Result<MetricMetadata> {
        self.store.get_metric(name)
    }

    pub fn list_metrics(&self, service_filter: Option<&str>, cancel: &CancellationToken) -> Result<Vec<MetricMetadata>> {
        self.store.list_metrics(service_filter, cancel)
    }

    pub fn get_span(&self, name: &str) -> Result<SpanMetadata> {
        self.store.get_span(name)
    }

    pub fn list_spans(&self, service_filter: Option<&str>, cancel: &CancellationToken) -> Result<Vec<SpanMetadata>> {
        self.store.list_spans(service_filter, cancel)
    }

    pub fn get_log(&self, severity_text: &str) -> Result<LogMetadata> {
        self.store.get_log(severity_text)
    }

    pub fn list_logs(&self, service_filter: Option<&str>, cancel: &CancellationToken) -> Result<Vec<LogMetadata>> {
        self.store.list_logs(service_filter, cancel)
    }

    pub fn get_attribute(&self, key: &str) -> Result<AttributeView> {
        self.store.get_attribute(key).map(|entry| AttributeView::from(&entry))
    }

    pub fn list_attributes(&self, filter: &AttributeFilter, cancel: &CancellationToken) -> Result<Vec<AttributeView>> {
        let entries = self.store.list_attribute_entries(cancel)?;
        Ok(query::filter_attributes(entries, filter))
    }

    pub fn store_attribute_value(
        &self,
        key: &str,
        value: Option<&str>,
        signal: SignalType,
        scope: CatalogScope,
    ) -> Result<()> {
        self.store.store_attribute_value(key, value, signal, scope)
    }

    pub fn list_services(&self) -> Vec<String> {
        self.store.list_services()
    }

    /// §6 `ServiceOverview`: metrics/spans/logs observed by `service`.
    pub fn get_service_overview(&self, service: &str, cancel: &CancellationToken) -> Result<ServiceOverview> {
        if service.is_empty() {
            return Err(CoreError::invalid_argument("service name must not be empty"));
        }
        if !self.store.service_known(service) {
            return Err(CoreError::not_found(format!("service {service}")));
        }
        let metrics = self.store.list_metrics(Some(service), cancel)?;
        let spans = self.store.list_spans(Some(service), cancel)?;
        let logs = self.store.list_logs(Some(service), cancel)?;
        Ok(query::build_service_overview(service, metrics, spans, logs))
    }

    /// §6 `PatternExplorerResponse`, built from every log entity's
    /// `body_templates`.
    pub fn explore_patterns(&self, filter: &PatternFilter, cancel: &CancellationToken) -> Result<Vec<PatternGroup>> {
        let logs = self.store.list_logs(None, cancel)?;
        Ok(query::explore_patterns(&logs, filter))
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn close(&self) {
        self.store.close();
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
    use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::metrics::v1::{metric::Data, number_data_point, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum};
    use opentelemetry_proto::tonic::resource::v1::Resource;

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(Value::StringValue(value.to_string())),
            }),
        }
    }

    fn metrics_request() -> ExportMetricsServiceRequest {
        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Some(Resource {
                    attributes: vec![kv("service.name", "web")],
                    dropped_attributes_count: 0,
                }),
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![Metric {
                        name: "http_requests_total".into(),
                        description: String::new(),
                        unit: String::new(),
                        metadata: Vec::new(),
                        data: Some(Data::Sum(Sum {
                            data_points: vec![NumberDataPoint {
                                attributes: vec![kv("method", "GET")],
                                start_time_unix_nano: 0,
                                time_unix_nano: 0,
                                exemplars: Vec::new(),
                                flags: 0,
                                value: Some(number_data_point::Value::AsInt(1)),
                            }],
                            aggregation_temporality: 0,
                            is_monotonic: true,
                        })),
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    #[test]
    fn ingest_metrics_creates_queryable_entity() {
        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let updated = analyzer.ingest_metrics(&metrics_request()).unwrap();
        assert_eq!(updated, 1);

        let metric = analyzer.get_metric("http_requests_total").unwrap();
        assert_eq!(metric.total_sample_count, 1);
        assert_eq!(metric.per_service_counts["web"], 1);
        assert_eq!(analyzer.list_services(), vec!["web".to_string()]);
    }

    #[test]
    fn service_overview_requires_known_service() {
        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let cancel = CancellationToken::new();
        assert!(analyzer.get_service_overview("ghost", &cancel).is_err());

        analyzer.ingest_metrics(&metrics_request()).unwrap();
        let overview = analyzer.get_service_overview("web", &cancel).unwrap();
        assert_eq!(overview.metric_count, 1);
        assert_eq!(overview.span_count, 0);
    }

    #[test]
    fn clear_resets_the_catalog() {
        let analyzer = Analyzer::new(AnalyzerConfig::default());
        analyzer.ingest_metrics(&metrics_request()).unwrap();
        analyzer.clear();
        assert!(analyzer.get_metric("http_requests_total").is_err());
        assert!(analyzer.list_services().is_empty());
    }
}
