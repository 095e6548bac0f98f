//! Shaped query responses (§6): filtering/sorting/pagination over the
//! attribute catalog, the per-service overview, and the cross-entity
//! pattern explorer built from logs' `BodyTemplate` rows.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::{
    AttributeCatalogEntry, BodyTemplate, CatalogScope, DropCounter, KeyMap, KeyMetadata, LogMetadata, MetricMetadata,
    MetricType, SignalType, SpanKind, SpanMetadata, SpanNamePattern, StatusCode,
};

/// Read-facing view of a [`KeyMetadata`] — the private sketch and sample
/// bucket collapse to their computed outputs, and the percentage (always
/// computed on read, never stored) is against the owning entity's total.
#[derive(Debug, Clone, Serialize)]
pub struct KeyMetadataView {
    pub count: u64,
    pub estimated_cardinality: u64,
    pub samples: Vec<String>,
    pub percentage: f64,
}

fn key_map_view(keys: &KeyMap, entity_total: u64) -> HashMap<String, KeyMetadataView> {
    keys.iter()
        .map(|(key, meta)| (key.clone(), key_metadata_view(meta, entity_total)))
        .collect()
}

fn key_metadata_view(meta: &KeyMetadata, entity_total: u64) -> KeyMetadataView {
    KeyMetadataView {
        count: meta.count,
        estimated_cardinality: meta.estimated_cardinality(),
        samples: meta.samples().to_vec(),
        percentage: meta.percentage(entity_total),
    }
}

/// Read-facing view of a [`MetricMetadata`] (§6 query API).
#[derive(Debug, Clone, Serialize)]
pub struct MetricView {
    pub name: String,
    pub metric_type: MetricType,
    pub unit: String,
    pub description: String,
    pub total_sample_count: u64,
    pub per_service_counts: HashMap<String, u64>,
    pub label_keys: HashMap<String, KeyMetadataView>,
    pub resource_keys: HashMap<String, KeyMetadataView>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl From<&MetricMetadata> for MetricView {
    fn from(m: &MetricMetadata) -> Self {
        Self {
            name: m.name.clone(),
            metric_type: m.metric_type,
            unit: m.unit.clone(),
            description: m.description.clone(),
            total_sample_count: m.total_sample_count,
            per_service_counts: m.per_service_counts.clone(),
            label_keys: key_map_view(&m.label_keys, m.total_sample_count),
            resource_keys: key_map_view(&m.resource_keys, m.total_sample_count),
            first_seen: m.first_seen,
            last_seen: m.last_seen,
        }
    }
}

/// Read-facing view of a [`SpanMetadata`] (§6 query API).
#[derive(Debug, Clone, Serialize)]
pub struct SpanView {
    pub name: String,
    pub kind: SpanKind,
    pub status_codes: HashSet<StatusCode>,
    pub total_sample_count: u64,
    pub per_service_counts: HashMap<String, u64>,
    pub attribute_keys: HashMap<String, KeyMetadataView>,
    pub resource_keys: HashMap<String, KeyMetadataView>,
    pub event_names: HashSet<String>,
    pub has_links: bool,
    pub dropped_attributes: DropCounter,
    pub dropped_events: DropCounter,
    pub dropped_links: DropCounter,
    pub name_patterns: Vec<SpanNamePattern>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl From<&SpanMetadata> for SpanView {
    fn from(s: &SpanMetadata) -> Self {
        Self {
            name: s.name.clone(),
            kind: s.kind,
            status_codes: s.status_codes.clone(),
            total_sample_count: s.total_sample_count,
            per_service_counts: s.per_service_counts.clone(),
            attribute_keys: key_map_view(&s.attribute_keys, s.total_sample_count),
            resource_keys: key_map_view(&s.resource_keys, s.total_sample_count),
            event_names: s.event_names.clone(),
            has_links: s.has_links,
            dropped_attributes: s.dropped_attributes,
            dropped_events: s.dropped_events,
            dropped_links: s.dropped_links,
            name_patterns: s.name_patterns.clone(),
            first_seen: s.first_seen,
            last_seen: s.last_seen,
        }
    }
}

/// Read-facing view of a [`LogMetadata`] (§6 query API). `body_templates`
/// is sorted by count descending, matching `sorted_body_templates()`.
#[derive(Debug, Clone, Serialize)]
pub struct LogView {
    pub severity_text: String,
    pub severity_number: i32,
    pub total_sample_count: u64,
    pub per_service_counts: HashMap<String, u64>,
    pub attribute_keys: HashMap<String, KeyMetadataView>,
    pub resource_keys: HashMap<String, KeyMetadataView>,
    pub body_templates: Vec<BodyTemplate>,
    pub has_trace_context: bool,
    pub has_span_context: bool,
    pub dropped_attributes: DropCounter,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl From<&LogMetadata> for LogView {
    fn from(l: &LogMetadata) -> Self {
        Self {
            severity_text: l.severity_text.clone(),
            severity_number: l.severity_number,
            total_sample_count: l.total_sample_count,
            per_service_counts: l.per_service_counts.clone(),
            attribute_keys: key_map_view(&l.attribute_keys, l.total_sample_count),
            resource_keys: key_map_view(&l.resource_keys, l.total_sample_count),
            body_templates: l.sorted_body_templates(),
            has_trace_context: l.has_trace_context,
            has_span_context: l.has_span_context,
            dropped_attributes: l.dropped_attributes,
            first_seen: l.first_seen,
            last_seen: l.last_seen,
        }
    }
}

/// Read-facing view of an [`AttributeCatalogEntry`] — the private sketch
/// and sample bucket collapse to their computed outputs.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeView {
    pub key: String,
    pub signal_types: Vec<SignalType>,
    pub scope: CatalogScope,
    pub estimated_cardinality: u64,
    pub samples: Vec<String>,
    pub observation_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl From<&AttributeCatalogEntry> for AttributeView {
    fn from(entry: &AttributeCatalogEntry) -> Self {
        let mut signal_types: Vec<SignalType> = entry.signal_types.iter().copied().collect();
        signal_types.sort_by_key(|s| s.to_string());
        Self {
            key: entry.key.clone(),
            signal_types,
            scope: entry.scope,
            estimated_cardinality: entry.estimated_cardinality(),
            samples: entry.samples().to_vec(),
            observation_count: entry.observation_count,
            first_seen: entry.first_seen,
            last_seen: entry.last_seen,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSort {
    Cardinality,
    Count,
    LastSeen,
    Key,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeFilter {
    pub signal_type: Option<SignalType>,
    pub scope: Option<CatalogScope>,
    pub min_cardinality: Option<u64>,
    pub sort: Option<AttributeSort>,
    pub descending: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Apply a filter/sort/page over a set of catalog entries, already read
/// under the attributes family lock (the caller owns the snapshot).
pub fn filter_attributes(entries: Vec<AttributeCatalogEntry>, filter: &AttributeFilter) -> Vec<AttributeView> {
    let mut views: Vec<AttributeView> = entries
        .iter()
        .filter(|e| filter.signal_type.map_or(true, |s| e.signal_types.contains(&s)))
        .filter(|e| filter.scope.map_or(true, |scope| e.scope == scope))
        .filter(|e| filter.min_cardinality.map_or(true, |min| e.estimated_cardinality() >= min))
        .map(AttributeView::from)
        .collect();

    match filter.sort.unwrap_or(AttributeSort::Key) {
        AttributeSort::Cardinality => views.sort_by_key(|v| v.estimated_cardinality),
        AttributeSort::Count => views.sort_by_key(|v| v.observation_count),
        AttributeSort::LastSeen => views.sort_by_key(|v| v.last_seen),
        AttributeSort::Key => views.sort_by(|a, b| a.key.cmp(&b.key)),
    }
    if filter.descending {
        views.reverse();
    }

    let offset = filter.offset.min(views.len());
    let remaining = &views[offset..];
    match filter.limit {
        Some(limit) => remaining[..limit.min(remaining.len())].to_vec(),
        None => remaining.to_vec(),
    }
}

/// §6 `ServiceOverview`: metrics/spans/logs filtered to the entities that
/// have observed this service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceOverview {
    pub service_name: String,
    pub metric_count: usize,
    pub span_count: usize,
    pub log_count: usize,
    pub metrics: Vec<MetricView>,
    pub spans: Vec<SpanView>,
    pub logs: Vec<LogView>,
}

pub fn build_service_overview(
    service_name: &str,
    metrics: Vec<MetricMetadata>,
    spans: Vec<SpanMetadata>,
    logs: Vec<LogMetadata>,
) -> ServiceOverview {
    ServiceOverview {
        service_name: service_name.to_string(),
        metric_count: metrics.len(),
        span_count: spans.len(),
        log_count: logs.len(),
        metrics: metrics.iter().map(MetricView::from).collect(),
        spans: spans.iter().map(SpanView::from).collect(),
        logs: logs.iter().map(LogView::from).collect(),
    }
}

/// §6 `ServicePatternInfo`. `resource_keys`/`attribute_keys` are the sorted
/// key names known on the log entities this service's rows of the pattern
/// were drawn from — the catalog doesn't segment a `KeyMetadata` sketch by
/// service, so this is "keys seen on severities this service hit this
/// pattern under", not a per-service-exact breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ServicePatternInfo {
    pub service_name: String,
    pub sample_count: u64,
    pub severities: Vec<String>,
    pub resource_keys: Vec<String>,
    pub attribute_keys: Vec<String>,
}

/// §6 `PatternGroup`.
#[derive(Debug, Clone, Serialize)]
pub struct PatternGroup {
    pub template: String,
    pub example_body: String,
    pub total_count: u64,
    pub severity_breakdown: HashMap<String, u64>,
    pub services: Vec<ServicePatternInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    pub min_count: Option<u64>,
    pub min_services: Option<usize>,
}

/// Build the cross-severity pattern explorer (§6 `PatternExplorerResponse`)
/// from every log entity's `body_templates`. A `BodyTemplate` already
/// carries the `(service, severity)` pair it was clustered under, so
/// grouping purely by template text recovers the full breakdown.
pub fn explore_patterns(logs: &[LogMetadata], filter: &PatternFilter) -> Vec<PatternGroup> {
    struct ServiceBuilding {
        sample_count: u64,
        severities: Vec<String>,
        resource_keys: HashSet<String>,
        attribute_keys: HashSet<String>,
    }

    struct Building {
        example_body: String,
        total_count: u64,
        severity_breakdown: HashMap<String, u64>,
        per_service: HashMap<String, ServiceBuilding>,
    }

    let mut groups: HashMap<String, Building> = HashMap::new();

    for log in logs {
        for row in &log.body_templates {
            let severity = row.severity.clone().unwrap_or_else(|| log.severity_text.clone());
            let service = row.service.clone().unwrap_or_else(|| "unknown".to_string());

            let building = groups.entry(row.template.clone()).or_insert_with(|| Building {
                example_body: row.example.clone(),
                total_count: 0,
                severity_breakdown: HashMap::new(),
                per_service: HashMap::new(),
            });

            building.total_count += row.count;
            *building.severity_breakdown.entry(severity.clone()).or_insert(0) += row.count;

            let service_info = building.per_service.entry(service.clone()).or_insert_with(|| ServiceBuilding {
                sample_count: 0,
                severities: Vec::new(),
                resource_keys: HashSet::new(),
                attribute_keys: HashSet::new(),
            });
            service_info.sample_count += row.count;
            if !service_info.severities.contains(&severity) {
                service_info.severities.push(severity);
            }
            service_info.resource_keys.extend(log.resource_keys.keys().cloned());
            service_info.attribute_keys.extend(log.attribute_keys.keys().cloned());
        }
    }

    let mut patterns: Vec<PatternGroup> = groups
        .into_iter()
        .map(|(template, building)| {
            let mut services: Vec<ServicePatternInfo> = building
                .per_service
                .into_iter()
                .map(|(service_name, sb)| {
                    let mut resource_keys: Vec<String> = sb.resource_keys.into_iter().collect();
                    resource_keys.sort();
                    let mut attribute_keys: Vec<String> = sb.attribute_keys.into_iter().collect();
                    attribute_keys.sort();
                    ServicePatternInfo {
                        service_name,
                        sample_count: sb.sample_count,
                        severities: sb.severities,
                        resource_keys,
                        attribute_keys,
                    }
                })
                .collect();
            services.sort_by(|a, b| a.service_name.cmp(&b.service_name));
            PatternGroup {
                template,
                example_body: building.example_body,
                total_count: building.total_count,
                severity_breakdown: building.severity_breakdown,
                services,
            }
        })
        .filter(|p| filter.min_count.map_or(true, |min| p.total_count >= min))
        .filter(|p| filter.min_services.map_or(true, |min| p.services.len() >= min))
        .collect();

    patterns.sort_by(|a, b| b.total_count.cmp(&a.total_count));
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::BodyTemplate;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn log_with_template(severity: &str, service: &str, template: &str, count: u64) -> LogMetadata {
        let mut log = LogMetadata::new(severity.to_string(), now());
        log.body_templates.push(BodyTemplate {
            template: template.to_string(),
            count,
            example: format!("{template} example"),
            last_matched: now(),
            service: Some(service.to_string()),
            severity: Some(severity.to_string()),
        });
        log
    }

    #[test]
    fn pattern_groups_merge_across_severities_and_services() {
        let logs = vec![
            log_with_template("ERROR", "web", "user <*> failed login", 100),
            log_with_template("WARN", "web", "user <*> failed login", 5),
            log_with_template("ERROR", "worker", "user <*> failed login", 3),
        ];

        let groups = explore_patterns(&logs, &PatternFilter::default());
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.total_count, 108);
        assert_eq!(group.severity_breakdown["ERROR"], 103);
        assert_eq!(group.severity_breakdown["WARN"], 5);
        assert_eq!(group.services.len(), 2);
    }

    #[test]
    fn min_services_filter_drops_single_service_patterns() {
        let logs = vec![log_with_template("ERROR", "web", "x", 1)];
        let filter = PatternFilter {
            min_count: None,
            min_services: Some(2),
        };
        assert!(explore_patterns(&logs, &filter).is_empty());
    }
}
