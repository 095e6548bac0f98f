//! Entity aggregator (§4.D): folds one extracted record (§4.A) into its
//! entity's metadata, feeding observed values into the cardinality sketches
//! (§4.B) and, for logs, the template clusterer (§4.C).
//!
//! Each `apply_*_record` function assumes the caller already holds the
//! owning family's write lock — that's where "first writer wins, non-empty
//! overrides empty" and the sketch/clusterer mutations all happen.

use chrono::{DateTime, Utc};

use crate::config::AnalyzerConfig;
use crate::entities::{
    BodyTemplate, KeyMap, KeyMetadata, LogMetadata, MetricMetadata, MetricType, SpanKind,
    SpanMetadata, SpanNamePattern,
};
use crate::otlp::common::KeyObservation;
use crate::otlp::logs::LogRecord;
use crate::otlp::metrics::MetricRecord;
use crate::otlp::traces::{templatize_span_name, SpanRecord};
use crate::templates::ShardedClusterer;

fn observe_keys(map: &mut KeyMap, observations: &[KeyObservation], config: &AnalyzerConfig) {
    for observation in observations {
        let key = map
            .entry(observation.key.clone())
            .or_insert_with(|| KeyMetadata::new(config.hll_precision, config.value_sample_cap));
        if let Some(value) = observation.canonical_value.as_deref() {
            key.observe(value);
        }
    }
}

pub fn apply_metric_record(
    entity: &mut MetricMetadata,
    record: &MetricRecord,
    now: DateTime<Utc>,
    config: &AnalyzerConfig,
) {
    entity.total_sample_count += 1;
    *entity.per_service_counts.entry(record.service.clone()).or_insert(0) += 1;
    observe_keys(&mut entity.label_keys, &record.label_observations, config);
    observe_keys(&mut entity.resource_keys, &record.resource_observations, config);

    if entity.metric_type == MetricType::Unspecified {
        entity.metric_type = record.metric_type;
    }
    if entity.unit.is_empty() {
        entity.unit = record.unit.clone();
    }
    if entity.description.is_empty() {
        entity.description = record.description.clone();
    }
    entity.last_seen = entity.last_seen.max(now);
    entity.first_seen = entity.first_seen.min(now);
}

pub fn apply_span_record(
    entity: &mut SpanMetadata,
    record: &SpanRecord,
    now: DateTime<Utc>,
    config: &AnalyzerConfig,
) {
    entity.total_sample_count += 1;
    *entity.per_service_counts.entry(record.service.clone()).or_insert(0) += 1;
    observe_keys(&mut entity.attribute_keys, &record.attribute_observations, config);
    observe_keys(&mut entity.resource_keys, &record.resource_observations, config);

    if entity.kind == SpanKind::Unspecified {
        entity.kind = record.kind;
    }
    entity.status_codes.insert(record.status_code);
    entity.event_names.extend(record.event_names.iter().cloned());
    entity.has_links = entity.has_links || record.has_links;
    entity.dropped_attributes.observe(record.dropped_attributes_count);
    entity.dropped_events.observe(record.dropped_events_count);
    entity.dropped_links.observe(record.dropped_links_count);

    let template = templatize_span_name(&record.name);
    match entity.name_patterns.iter_mut().find(|p| p.template == template) {
        Some(pattern) => pattern.observe(&record.name),
        None => entity.name_patterns.push(SpanNamePattern::new(template, record.name.clone())),
    }

    entity.last_seen = entity.last_seen.max(now);
    entity.first_seen = entity.first_seen.min(now);
}

pub fn apply_log_record(
    entity: &mut LogMetadata,
    record: &LogRecord,
    now: DateTime<Utc>,
    config: &AnalyzerConfig,
    clusterer: &mut ShardedClusterer,
) {
    entity.total_sample_count += 1;
    *entity.per_service_counts.entry(record.service.clone()).or_insert(0) += 1;
    observe_keys(&mut entity.attribute_keys, &record.attribute_observations, config);
    observe_keys(&mut entity.resource_keys, &record.resource_observations, config);

    if entity.severity_number == 0 {
        entity.severity_number = record.severity_number;
    }
    entity.has_trace_context = entity.has_trace_context || record.has_trace_context;
    entity.has_span_context = entity.has_span_context || record.has_span_context;
    entity.dropped_attributes.observe(record.dropped_attributes_count);

    if config.auto_template {
        if let Some(body) = record.body_text.as_deref() {
            let template = clusterer.observe(&record.service, &entity.severity_text, body, now);
            upsert_body_template(entity, &record.service, &entity_severity(entity), &template, body, now);
        }
    }

    entity.last_seen = entity.last_seen.max(now);
    entity.first_seen = entity.first_seen.min(now);
}

fn entity_severity(entity: &LogMetadata) -> String {
    entity.severity_text.clone()
}

fn upsert_body_template(
    entity: &mut LogMetadata,
    service: &str,
    severity: &str,
    template: &str,
    example: &str,
    now: DateTime<Utc>,
) {
    match entity
        .body_templates
        .iter_mut()
        .find(|t| t.template == template && t.service.as_deref() == Some(service))
    {
        Some(existing) => {
            existing.count += 1;
            existing.last_matched = now;
        }
        None => entity.body_templates.push(BodyTemplate {
            template: template.to_string(),
            count: 1,
            example: example.to_string(),
            last_matched: now,
            service: Some(service.to_string()),
            severity: Some(severity.to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Scope;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn metric_first_writer_wins_for_unit_and_type() {
        let config = AnalyzerConfig::default();
        let mut entity = MetricMetadata::new("http_requests_total".into(), now());
        let record = MetricRecord {
            name: "http_requests_total".into(),
            metric_type: MetricType::Sum,
            unit: "1".into(),
            description: "count of requests".into(),
            service: "web".into(),
            resource_observations: vec![],
            label_observations: vec![KeyObservation {
                scope: Scope::Attribute,
                key: "method".into(),
                canonical_value: Some("GET".into()),
            }],
        };
        apply_metric_record(&mut entity, &record, now(), &config);

        let second = MetricRecord {
            metric_type: MetricType::Gauge,
            unit: "ms".into(),
            ..record.clone()
        };
        apply_metric_record(&mut entity, &second, now(), &config);

        assert_eq!(entity.metric_type, MetricType::Sum);
        assert_eq!(entity.unit, "1");
        assert_eq!(entity.total_sample_count, 2);
        assert_eq!(entity.label_keys["method"].count, 2);
    }

    #[test]
    fn log_record_produces_body_template_tagged_by_service() {
        let config = AnalyzerConfig::default();
        let mut clusterer = ShardedClusterer::new(config.shards, config.max_depth, config.max_clusters, config.sim_threshold);
        let mut entity = LogMetadata::new("ERROR".into(), now());
        let record = LogRecord {
            severity_text: "ERROR".into(),
            severity_number: 17,
            service: "api".into(),
            resource_observations: vec![],
            attribute_observations: vec![],
            body_text: Some("user 1 failed login".into()),
            has_trace_context: false,
            has_span_context: false,
            dropped_attributes_count: 0,
        };
        apply_log_record(&mut entity, &record, now(), &config, &mut clusterer);
        assert_eq!(entity.body_templates.len(), 1);
        assert_eq!(entity.body_templates[0].template, "user <*> failed login");
        assert_eq!(entity.body_templates[0].service.as_deref(), Some("api"));
    }
}
