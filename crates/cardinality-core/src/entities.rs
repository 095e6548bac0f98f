//! Data model (§3): the per-signal metadata records held by the memory
//! store, and the key/attribute records nested inside them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cardinality::{HyperLogLog, SampleBucket};

/// One of the three OTLP signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Metric,
    Span,
    Log,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Metric => write!(f, "metric"),
            SignalType::Span => write!(f, "span"),
            SignalType::Log => write!(f, "log"),
        }
    }
}

/// Where an attribute key was observed, as emitted by the key extractor
/// (§4.A). Spans distinguish event and link attributes from the span's own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Resource,
    Attribute,
    Event(String),
    Link,
}

impl Scope {
    /// Collapse to the coarser resource/attribute distinction the
    /// cross-signal attribute catalog (§4.E) tracks.
    pub fn coarse(&self) -> CatalogScope {
        match self {
            Scope::Resource => CatalogScope::Resource,
            Scope::Attribute | Scope::Event(_) | Scope::Link => CatalogScope::Attribute,
        }
    }
}

/// Scope tag stored on [`AttributeCatalogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogScope {
    Resource,
    Attribute,
    Both,
}

impl CatalogScope {
    /// Widen towards `Both` when a key has been seen under the other scope too.
    pub fn merged_with(self, other: CatalogScope) -> CatalogScope {
        if self == other {
            self
        } else {
            CatalogScope::Both
        }
    }
}

/// OTLP metric type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Unspecified,
    Gauge,
    Sum,
    Histogram,
    ExponentialHistogram,
    Summary,
}

impl Default for MetricType {
    fn default() -> Self {
        MetricType::Unspecified
    }
}

/// OTLP span kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl Default for SpanKind {
    fn default() -> Self {
        SpanKind::Unspecified
    }
}

/// OTLP span status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Unset,
    Ok,
    Error,
}

/// A `{total, max}` counter for OTLP's dropped-attribute/event/link fields.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DropCounter {
    pub total: u64,
    pub max: u32,
}

impl DropCounter {
    pub fn observe(&mut self, dropped: u32) {
        self.total += dropped as u64;
        if dropped > self.max {
            self.max = dropped;
        }
    }

    pub fn merge(&mut self, other: &DropCounter) {
        self.total += other.total;
        if other.max > self.max {
            self.max = other.max;
        }
    }
}

/// Per-key observation record (§3 `KeyMetadata`). `count` and the sketch are
/// authoritative; `percentage` is always computed on read from the owning
/// entity's total (Open Question 1, resolved in DESIGN.md).
#[derive(Debug, Clone)]
pub struct KeyMetadata {
    pub count: u64,
    sketch: HyperLogLog,
    samples: SampleBucket,
}

impl KeyMetadata {
    pub fn new(hll_precision: u8, value_sample_cap: usize) -> Self {
        Self {
            count: 0,
            sketch: HyperLogLog::new(hll_precision),
            samples: SampleBucket::new(value_sample_cap),
        }
    }

    /// Record one observation of `canonical_value` (already canonicalized
    /// by `value_canon::canonicalize`).
    pub fn observe(&mut self, canonical_value: &str) {
        self.count += 1;
        self.sketch.insert(canonical_value.as_bytes());
        self.samples.insert(canonical_value);
    }

    pub fn estimated_cardinality(&self) -> u64 {
        self.sketch.estimate()
    }

    pub fn samples(&self) -> &[String] {
        self.samples.values()
    }

    pub fn percentage(&self, entity_total: u64) -> f64 {
        if entity_total == 0 {
            0.0
        } else {
            (self.count as f64) * 100.0 / (entity_total as f64)
        }
    }

    pub fn merge(&mut self, other: &KeyMetadata) {
        self.count += other.count;
        self.sketch.merge(&other.sketch);
        self.samples.merge(&other.samples);
    }
}

pub type KeyMap = HashMap<String, KeyMetadata>;

/// Merge `incoming` into `base`, summing counts for colliding keys and
/// union-ing the rest (invariant 2: key maps are monotone-growing sets).
pub fn merge_key_maps(base: &mut KeyMap, incoming: KeyMap) {
    for (key, meta) in incoming {
        match base.get_mut(&key) {
            Some(existing) => existing.merge(&meta),
            None => {
                base.insert(key, meta);
            }
        }
    }
}

fn merge_counts(base: &mut HashMap<String, u64>, incoming: &HashMap<String, u64>) {
    for (service, count) in incoming {
        *base.entry(service.clone()).or_insert(0) += count;
    }
}

/// A clustered, templated log body (§4.C output, §3 `BodyTemplate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyTemplate {
    pub template: String,
    pub count: u64,
    pub example: String,
    pub last_matched: DateTime<Utc>,
    pub service: Option<String>,
    pub severity: Option<String>,
}

/// A templated span-name pattern (§4.D.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanNamePattern {
    pub template: String,
    pub count: u64,
    pub examples: Vec<String>,
}

const MAX_SPAN_NAME_EXAMPLES: usize = 3;

impl SpanNamePattern {
    pub fn new(template: String, example: String) -> Self {
        Self {
            template,
            count: 1,
            examples: vec![example],
        }
    }

    pub fn observe(&mut self, example: &str) {
        self.count += 1;
        if self.examples.len() < MAX_SPAN_NAME_EXAMPLES && !self.examples.iter().any(|e| e == example) {
            self.examples.push(example.to_string());
        }
    }
}

fn first_non_empty(a: String, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else {
        a
    }
}

/// §3 `MetricMetadata`, identified by metric name.
#[derive(Debug, Clone)]
pub struct MetricMetadata {
    pub name: String,
    pub metric_type: MetricType,
    pub unit: String,
    pub description: String,
    pub total_sample_count: u64,
    pub per_service_counts: HashMap<String, u64>,
    pub label_keys: KeyMap,
    pub resource_keys: KeyMap,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl MetricMetadata {
    pub fn new(name: String, now: DateTime<Utc>) -> Self {
        Self {
            name,
            metric_type: MetricType::Unspecified,
            unit: String::new(),
            description: String::new(),
            total_sample_count: 0,
            per_service_counts: HashMap::new(),
            label_keys: HashMap::new(),
            resource_keys: HashMap::new(),
            first_seen: now,
            last_seen: now,
        }
    }

    /// Merge-on-store semantics (§4.F): sum counts, union key maps, adopt
    /// the earlier first_seen/later last_seen, keep the first non-empty
    /// type/unit/description.
    pub fn merge(&mut self, other: MetricMetadata) {
        self.total_sample_count += other.total_sample_count;
        merge_counts(&mut self.per_service_counts, &other.per_service_counts);
        merge_key_maps(&mut self.label_keys, other.label_keys);
        merge_key_maps(&mut self.resource_keys, other.resource_keys);
        if self.metric_type == MetricType::Unspecified {
            self.metric_type = other.metric_type;
        }
        self.unit = first_non_empty(std::mem::take(&mut self.unit), &other.unit);
        self.description = first_non_empty(std::mem::take(&mut self.description), &other.description);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }
}

/// §3 `SpanMetadata`, identified by span name.
#[derive(Debug, Clone)]
pub struct SpanMetadata {
    pub name: String,
    pub kind: SpanKind,
    pub status_codes: HashSet<StatusCode>,
    pub total_sample_count: u64,
    pub per_service_counts: HashMap<String, u64>,
    pub attribute_keys: KeyMap,
    pub resource_keys: KeyMap,
    pub event_names: HashSet<String>,
    pub has_links: bool,
    pub dropped_attributes: DropCounter,
    pub dropped_events: DropCounter,
    pub dropped_links: DropCounter,
    pub name_patterns: Vec<SpanNamePattern>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SpanMetadata {
    pub fn new(name: String, now: DateTime<Utc>) -> Self {
        Self {
            name,
            kind: SpanKind::Unspecified,
            status_codes: HashSet::new(),
            total_sample_count: 0,
            per_service_counts: HashMap::new(),
            attribute_keys: HashMap::new(),
            resource_keys: HashMap::new(),
            event_names: HashSet::new(),
            has_links: false,
            dropped_attributes: DropCounter::default(),
            dropped_events: DropCounter::default(),
            dropped_links: DropCounter::default(),
            name_patterns: Vec::new(),
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn merge(&mut self, other: SpanMetadata) {
        self.total_sample_count += other.total_sample_count;
        merge_counts(&mut self.per_service_counts, &other.per_service_counts);
        merge_key_maps(&mut self.attribute_keys, other.attribute_keys);
        merge_key_maps(&mut self.resource_keys, other.resource_keys);
        if self.kind == SpanKind::Unspecified {
            self.kind = other.kind;
        }
        self.status_codes.extend(other.status_codes);
        self.event_names.extend(other.event_names);
        self.has_links = self.has_links || other.has_links;
        self.dropped_attributes.merge(&other.dropped_attributes);
        self.dropped_events.merge(&other.dropped_events);
        self.dropped_links.merge(&other.dropped_links);
        merge_name_patterns(&mut self.name_patterns, other.name_patterns);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }
}

fn merge_name_patterns(base: &mut Vec<SpanNamePattern>, incoming: Vec<SpanNamePattern>) {
    for pattern in incoming {
        if let Some(existing) = base.iter_mut().find(|p| p.template == pattern.template) {
            existing.count += pattern.count;
            for example in pattern.examples {
                if existing.examples.len() < MAX_SPAN_NAME_EXAMPLES
                    && !existing.examples.iter().any(|e| *e == example)
                {
                    existing.examples.push(example);
                }
            }
        } else {
            base.push(pattern);
        }
    }
}

/// §3 `LogMetadata`, identified by severity text (empty normalizes to `UNSET`).
#[derive(Debug, Clone)]
pub struct LogMetadata {
    pub severity_text: String,
    pub severity_number: i32,
    pub total_sample_count: u64,
    pub per_service_counts: HashMap<String, u64>,
    pub attribute_keys: KeyMap,
    pub resource_keys: KeyMap,
    pub body_templates: Vec<BodyTemplate>,
    pub has_trace_context: bool,
    pub has_span_context: bool,
    pub dropped_attributes: DropCounter,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Severity text normalization: empty input maps to the literal `"UNSET"`
/// identifier (invariant / testable property #13).
pub fn normalize_severity_text(severity_text: &str) -> String {
    if severity_text.is_empty() {
        "UNSET".to_string()
    } else {
        severity_text.to_string()
    }
}

impl LogMetadata {
    pub fn new(severity_text: String, now: DateTime<Utc>) -> Self {
        Self {
            severity_text,
            severity_number: 0,
            total_sample_count: 0,
            per_service_counts: HashMap::new(),
            attribute_keys: HashMap::new(),
            resource_keys: HashMap::new(),
            body_templates: Vec::new(),
            has_trace_context: false,
            has_span_context: false,
            dropped_attributes: DropCounter::default(),
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn merge(&mut self, other: LogMetadata) {
        self.total_sample_count += other.total_sample_count;
        merge_counts(&mut self.per_service_counts, &other.per_service_counts);
        merge_key_maps(&mut self.attribute_keys, other.attribute_keys);
        merge_key_maps(&mut self.resource_keys, other.resource_keys);
        if self.severity_number == 0 {
            self.severity_number = other.severity_number;
        }
        self.has_trace_context = self.has_trace_context || other.has_trace_context;
        self.has_span_context = self.has_span_context || other.has_span_context;
        self.dropped_attributes.merge(&other.dropped_attributes);
        // The aggregator re-derives BodyTemplates from the clusterer's
        // current shard state on every ingest, so the latest list already
        // reflects merged counts; a plain replace is correct here.
        self.body_templates = other.body_templates;
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }

    /// Templates sorted by match count descending, as required on read.
    pub fn sorted_body_templates(&self) -> Vec<BodyTemplate> {
        let mut templates = self.body_templates.clone();
        templates.sort_by(|a, b| b.count.cmp(&a.count));
        templates
    }
}

/// §3 `AttributeCatalogEntry`: a cross-signal index entry for one key.
#[derive(Debug, Clone)]
pub struct AttributeCatalogEntry {
    pub key: String,
    pub signal_types: HashSet<SignalType>,
    pub scope: CatalogScope,
    sketch: HyperLogLog,
    samples: SampleBucket,
    pub observation_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl AttributeCatalogEntry {
    pub fn new(
        key: String,
        signal: SignalType,
        scope: CatalogScope,
        hll_precision: u8,
        value_sample_cap: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let mut signal_types = HashSet::new();
        signal_types.insert(signal);
        Self {
            key,
            signal_types,
            scope,
            sketch: HyperLogLog::new(hll_precision),
            samples: SampleBucket::new(value_sample_cap),
            observation_count: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn observe(&mut self, signal: SignalType, scope: CatalogScope, canonical_value: Option<&str>, now: DateTime<Utc>) {
        self.signal_types.insert(signal);
        self.scope = self.scope.merged_with(scope);
        self.observation_count += 1;
        if let Some(value) = canonical_value {
            self.sketch.insert(value.as_bytes());
            self.samples.insert(value);
        }
        self.last_seen = self.last_seen.max(now);
        self.first_seen = self.first_seen.min(now);
    }

    pub fn estimated_cardinality(&self) -> u64 {
        self.sketch.estimate()
    }

    pub fn samples(&self) -> &[String] {
        self.samples.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn severity_text_normalizes_empty_to_unset() {
        assert_eq!(normalize_severity_text(""), "UNSET");
        assert_eq!(normalize_severity_text("ERROR"), "ERROR");
    }

    #[test]
    fn metric_merge_sums_counts_and_unions_keys() {
        let mut a = MetricMetadata::new("http_requests_total".into(), now());
        a.total_sample_count = 1;
        a.per_service_counts.insert("web".into(), 1);
        let mut key = KeyMetadata::new(14, 10);
        key.observe("GET");
        a.label_keys.insert("method".into(), key);

        let mut b = MetricMetadata::new("http_requests_total".into(), now());
        b.total_sample_count = 1;
        b.per_service_counts.insert("web".into(), 1);
        let mut key_b = KeyMetadata::new(14, 10);
        key_b.observe("POST");
        b.label_keys.insert("method".into(), key_b);

        a.merge(b);
        assert_eq!(a.total_sample_count, 2);
        assert_eq!(a.per_service_counts["web"], 2);
        let method = &a.label_keys["method"];
        assert_eq!(method.count, 2);
        assert_eq!(method.estimated_cardinality(), 2);
    }

    #[test]
    fn span_name_pattern_caps_examples_at_three() {
        let mut pattern = SpanNamePattern::new("GET /users/<*>".into(), "GET /users/42".into());
        pattern.observe("GET /users/43");
        pattern.observe("GET /users/44");
        pattern.observe("GET /users/45");
        assert_eq!(pattern.count, 4);
        assert_eq!(pattern.examples.len(), 3);
    }

    #[test]
    fn first_seen_last_seen_invariant_holds_after_merge() {
        let mut a = MetricMetadata::new("m".into(), DateTime::from_timestamp(100, 0).unwrap());
        let b = MetricMetadata::new("m".into(), DateTime::from_timestamp(50, 0).unwrap());
        a.last_seen = DateTime::from_timestamp(200, 0).unwrap();
        a.merge(b);
        assert!(a.first_seen <= a.last_seen);
        assert_eq!(a.first_seen, DateTime::from_timestamp(50, 0).unwrap());
    }
}
