//! Concurrent in-memory store (§4.F, §5): one `parking_lot::RwLock` per
//! entity family (`metrics`, `spans`, `logs`, `attributes`, `services`).
//! Writers hold the exclusive lock only for the duration of one request's
//! updates to that family; readers take the shared lock for the whole of a
//! list walk. No call ever holds two family locks at once.

pub mod registry;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{apply_log_record, apply_metric_record, apply_span_record};
use crate::config::AnalyzerConfig;
use crate::entities::{
    AttributeCatalogEntry, CatalogScope, LogMetadata, MetricMetadata, SignalType, SpanMetadata,
};
use crate::error::{CoreError, Result};
use crate::otlp::common::KeyObservation;
use crate::otlp::logs::LogRecord;
use crate::otlp::metrics::MetricRecord;
use crate::otlp::traces::SpanRecord;
use crate::templates::ShardedClusterer;
use registry::ServiceRegistry;

struct LogsFamily {
    entries: HashMap<String, LogMetadata>,
    clusterer: ShardedClusterer,
}

/// Host for the four entity families plus the service-name set. Merge-on-
/// store is the only write path: every `store_*`/`ingest_*` call either
/// creates a new entity or folds into the existing one under natural key
/// (metric name, span name, severity text).
pub struct MemoryStore {
    config: AnalyzerConfig,
    metrics: RwLock<HashMap<String, MetricMetadata>>,
    spans: RwLock<HashMap<String, SpanMetadata>>,
    logs: RwLock<LogsFamily>,
    attributes: RwLock<HashMap<String, AttributeCatalogEntry>>,
    services: ServiceRegistry,
    closed: AtomicBool,
}

fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        Err(CoreError::invalid_argument(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}

fn check_cancel(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(CoreError::Canceled)
    } else {
        Ok(())
    }
}

impl MemoryStore {
    pub fn new(config: AnalyzerConfig) -> Self {
        let clusterer = ShardedClusterer::new(
            config.shards,
            config.max_depth,
            config.max_clusters,
            config.sim_threshold,
        );
        Self {
            config,
            metrics: RwLock::new(HashMap::new()),
            spans: RwLock::new(HashMap::new()),
            logs: RwLock::new(LogsFamily {
                entries: HashMap::new(),
                clusterer,
            }),
            attributes: RwLock::new(HashMap::new()),
            services: ServiceRegistry::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CoreError::Closed)
        } else {
            Ok(())
        }
    }

    // ---- metrics -----------------------------------------------------

    /// Fold a batch of extracted metric records (one OTLP ingest request)
    /// into the metrics family. Service registration and attribute-catalog
    /// observation run in their own pass, each taking and releasing its own
    /// family lock, before the metrics family lock is ever acquired — no
    /// call holds two family locks at once.
    pub fn ingest_metrics(&self, records: &[MetricRecord], now: DateTime<Utc>) -> Result<usize> {
        self.ensure_open()?;
        for record in records {
            self.services.register(&record.service);
            self.observe_attribute_catalog(SignalType::Metric, &record.resource_observations, now);
            self.observe_attribute_catalog(SignalType::Metric, &record.label_observations, now);
        }

        let mut touched = HashSet::with_capacity(records.len());
        let mut family = self.metrics.write();
        for record in records {
            touched.insert(record.name.clone());
            let entity = family
                .entry(record.name.clone())
                .or_insert_with(|| MetricMetadata::new(record.name.clone(), now));
            apply_metric_record(entity, record, now, &self.config);
        }
        Ok(touched.len())
    }

    pub fn store_metric(&self, incoming: MetricMetadata) -> Result<()> {
        self.ensure_open()?;
        require_non_empty(&incoming.name, "metric name")?;
        let mut family = self.metrics.write();
        match family.get_mut(&incoming.name) {
            Some(existing) => existing.merge(incoming),
            None => {
                family.insert(incoming.name.clone(), incoming);
            }
        }
        Ok(())
    }

    pub fn get_metric(&self, name: &str) -> Result<MetricMetadata> {
        require_non_empty(name, "metric name")?;
        self.metrics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("metric {name}")))
    }

    pub fn list_metrics(
        &self,
        service_filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MetricMetadata>> {
        let family = self.metrics.read();
        let mut names: Vec<&String> = family.keys().collect();
        names.sort();
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            check_cancel(cancel)?;
            let metric = &family[name];
            if let Some(service) = service_filter {
                if !metric.per_service_counts.contains_key(service) {
                    continue;
                }
            }
            results.push(metric.clone());
        }
        Ok(results)
    }

    // ---- spans ---------------------------------------------------------

    pub fn ingest_spans(&self, records: &[SpanRecord], now: DateTime<Utc>) -> Result<usize> {
        self.ensure_open()?;
        for record in records {
            self.services.register(&record.service);
            self.observe_attribute_catalog(SignalType::Span, &record.resource_observations, now);
            self.observe_attribute_catalog(SignalType::Span, &record.attribute_observations, now);
        }

        let mut touched = HashSet::with_capacity(records.len());
        let mut family = self.spans.write();
        for record in records {
            touched.insert(record.name.clone());
            let entity = family
                .entry(record.name.clone())
                .or_insert_with(|| SpanMetadata::new(record.name.clone(), now));
            apply_span_record(entity, record, now, &self.config);
        }
        Ok(touched.len())
    }

    pub fn store_span(&self, incoming: SpanMetadata) -> Result<()> {
        self.ensure_open()?;
        require_non_empty(&incoming.name, "span name")?;
        let mut family = self.spans.write();
        match family.get_mut(&incoming.name) {
            Some(existing) => existing.merge(incoming),
            None => {
                family.insert(incoming.name.clone(), incoming);
            }
        }
        Ok(())
    }

    pub fn get_span(&self, name: &str) -> Result<SpanMetadata> {
        require_non_empty(name, "span name")?;
        self.spans
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("span {name}")))
    }

    pub fn list_spans(
        &self,
        service_filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SpanMetadata>> {
        let family = self.spans.read();
        let mut names: Vec<&String> = family.keys().collect();
        names.sort();
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            check_cancel(cancel)?;
            let span = &family[name];
            if let Some(service) = service_filter {
                if !span.per_service_counts.contains_key(service) {
                    continue;
                }
            }
            results.push(span.clone());
        }
        Ok(results)
    }

    // ---- logs ------------------------------------------------------------

    pub fn ingest_logs(&self, records: &[LogRecord], now: DateTime<Utc>) -> Result<usize> {
        self.ensure_open()?;
        for record in records {
            self.services.register(&record.service);
            self.observe_attribute_catalog(SignalType::Log, &record.resource_observations, now);
            self.observe_attribute_catalog(SignalType::Log, &record.attribute_observations, now);
        }

        let mut touched = HashSet::with_capacity(records.len());
        let mut family = self.logs.write();
        for record in records {
            let severity = record.severity_text.clone();
            touched.insert(severity.clone());
            let LogsFamily { entries, clusterer } = &mut *family;
            let entity = entries
                .entry(severity.clone())
                .or_insert_with(|| LogMetadata::new(severity, now));
            apply_log_record(entity, record, now, &self.config, clusterer);
        }
        Ok(touched.len())
    }

    pub fn store_log(&self, incoming: LogMetadata) -> Result<()> {
        self.ensure_open()?;
        let mut family = self.logs.write();
        match family.entries.get_mut(&incoming.severity_text) {
            Some(existing) => existing.merge(incoming),
            None => {
                family.entries.insert(incoming.severity_text.clone(), incoming);
            }
        }
        Ok(())
    }

    pub fn get_log(&self, severity_text: &str) -> Result<LogMetadata> {
        let key = crate::entities::normalize_severity_text(severity_text);
        self.logs
            .read()
            .entries
            .get(&key)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("log severity {key}")))
    }

    pub fn list_logs(
        &self,
        service_filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogMetadata>> {
        let family = self.logs.read();
        let mut names: Vec<&String> = family.entries.keys().collect();
        names.sort();
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            check_cancel(cancel)?;
            let log = &family.entries[name];
            if let Some(service) = service_filter {
                if !log.per_service_counts.contains_key(service) {
                    continue;
                }
            }
            results.push(log.clone());
        }
        Ok(results)
    }

    // ---- attribute catalog ----------------------------------------------

    fn observe_attribute_catalog(
        &self,
        signal: SignalType,
        observations: &[KeyObservation],
        now: DateTime<Utc>,
    ) {
        if observations.is_empty() {
            return;
        }
        let mut family = self.attributes.write();
        for observation in observations {
            let scope = observation.scope.coarse();
            let entry = family.entry(observation.key.clone()).or_insert_with(|| {
                AttributeCatalogEntry::new(
                    observation.key.clone(),
                    signal,
                    scope,
                    self.config.hll_precision,
                    self.config.value_sample_cap,
                    now,
                )
            });
            entry.observe(signal, scope, observation.canonical_value.as_deref(), now);
        }
    }

    pub fn store_attribute_value(
        &self,
        key: &str,
        value: Option<&str>,
        signal: SignalType,
        scope: CatalogScope,
    ) -> Result<()> {
        self.ensure_open()?;
        require_non_empty(key, "attribute key")?;
        let now = Utc::now();
        let mut family = self.attributes.write();
        let entry = family.entry(key.to_string()).or_insert_with(|| {
            AttributeCatalogEntry::new(
                key.to_string(),
                signal,
                scope,
                self.config.hll_precision,
                self.config.value_sample_cap,
                now,
            )
        });
        entry.observe(signal, scope, value, now);
        Ok(())
    }

    pub fn get_attribute(&self, key: &str) -> Result<AttributeCatalogEntry> {
        self.attributes
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("attribute {key}")))
    }

    pub fn list_attribute_entries(&self, cancel: &CancellationToken) -> Result<Vec<AttributeCatalogEntry>> {
        let family = self.attributes.read();
        let mut keys: Vec<&String> = family.keys().collect();
        keys.sort();
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            check_cancel(cancel)?;
            results.push(family[key].clone());
        }
        Ok(results)
    }

    // ---- services ----------------------------------------------------

    pub fn list_services(&self) -> Vec<String> {
        self.services.list()
    }

    pub fn service_known(&self, service: &str) -> bool {
        self.services.contains(service)
    }

    // ---- lifecycle -----------------------------------------------------

    /// Empty all containers. Atomic with respect to readers between calls:
    /// each family is cleared under its own write lock, one at a time.
    pub fn clear(&self) {
        self.metrics.write().clear();
        self.spans.write().clear();
        {
            let mut logs = self.logs.write();
            logs.entries.clear();
            logs.clusterer = ShardedClusterer::new(
                self.config.shards,
                self.config.max_depth,
                self.config.max_clusters,
                self.config.sim_threshold,
            );
        }
        self.attributes.write().clear();
        self.services.clear();
    }

    /// Idempotent; after close, every write method returns `CoreError::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Scope;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn metric_record(service: &str) -> MetricRecord {
        MetricRecord {
            name: "http_requests_total".into(),
            metric_type: crate::entities::MetricType::Sum,
            unit: "1".into(),
            description: String::new(),
            service: service.to_string(),
            resource_observations: vec![],
            label_observations: vec![KeyObservation {
                scope: Scope::Attribute,
                key: "method".into(),
                canonical_value: Some("GET".into()),
            }],
        }
    }

    #[test]
    fn ingest_twice_merges_into_one_entity() {
        let store = MemoryStore::new(AnalyzerConfig::default());
        store.ingest_metrics(&[metric_record("web")], now()).unwrap();
        store.ingest_metrics(&[metric_record("web")], now()).unwrap();

        let metric = store.get_metric("http_requests_total").unwrap();
        assert_eq!(metric.total_sample_count, 2);
        assert_eq!(metric.per_service_counts["web"], 2);
    }

    #[test]
    fn list_metrics_filters_by_service() {
        let store = MemoryStore::new(AnalyzerConfig::default());
        store.ingest_metrics(&[metric_record("web")], now()).unwrap();
        store.ingest_metrics(&[metric_record("worker")], now()).unwrap();

        let cancel = CancellationToken::new();
        let web_only = store.list_metrics(Some("web"), &cancel).unwrap();
        assert_eq!(web_only.len(), 1);
        assert_eq!(web_only[0].per_service_counts.get("worker"), None);
    }

    #[test]
    fn list_respects_cancellation() {
        let store = MemoryStore::new(AnalyzerConfig::default());
        store.ingest_metrics(&[metric_record("web")], now()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = store.list_metrics(None, &cancel);
        assert!(matches!(result, Err(CoreError::Canceled)));
    }

    #[test]
    fn writes_after_close_are_rejected() {
        let store = MemoryStore::new(AnalyzerConfig::default());
        store.close();
        let result = store.ingest_metrics(&[metric_record("web")], now());
        assert!(matches!(result, Err(CoreError::Closed)));
    }

    #[test]
    fn clear_empties_all_families() {
        let store = MemoryStore::new(AnalyzerConfig::default());
        store.ingest_metrics(&[metric_record("web")], now()).unwrap();
        store.clear();
        assert!(store.get_metric("http_requests_total").is_err());
        assert!(store.list_services().is_empty());
    }

    #[test]
    fn attribute_catalog_tracks_cross_signal_scope() {
        let store = MemoryStore::new(AnalyzerConfig::default());
        store.ingest_metrics(&[metric_record("web")], now()).unwrap();
        let method = store.get_attribute("method").unwrap();
        assert_eq!(method.scope, CatalogScope::Attribute);
        assert!(method.signal_types.contains(&SignalType::Metric));
        assert_eq!(method.estimated_cardinality(), 1);
    }
}
