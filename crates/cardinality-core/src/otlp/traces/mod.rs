//! Key extraction for OTLP traces (§4.A): walks an
//! `ExportTraceServiceRequest` and emits one [`SpanRecord`] per span, with
//! nested scope subtags for event (`event:<name>`) and link attributes.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::{span, status, Span};

use crate::entities::{Scope, SpanKind, StatusCode};
use crate::otlp::common::{extract_keyvalues, service_name, KeyObservation};

/// One span's worth of extracted schema information.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub name: String,
    pub kind: SpanKind,
    pub status_code: StatusCode,
    pub service: String,
    pub resource_observations: Vec<KeyObservation>,
    /// Span attributes, plus event (`Scope::Event(name)`) and link
    /// (`Scope::Link`) attributes, all tagged by their own scope subtag.
    pub attribute_observations: Vec<KeyObservation>,
    pub event_names: Vec<String>,
    pub has_links: bool,
    pub dropped_attributes_count: u32,
    pub dropped_events_count: u32,
    pub dropped_links_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TracesWalkStats {
    pub resource_spans_count: usize,
    pub scope_spans_count: usize,
    pub span_count: usize,
}

pub fn walk(request: &ExportTraceServiceRequest) -> (Vec<SpanRecord>, TracesWalkStats) {
    let mut records = Vec::new();
    let mut stats = TracesWalkStats::default();

    for resource_spans in &request.resource_spans {
        stats.resource_spans_count += 1;
        let service = service_name(resource_spans.resource.as_ref());
        let resource_observations = resource_spans
            .resource
            .as_ref()
            .map(|r| extract_keyvalues(&r.attributes, Scope::Resource))
            .unwrap_or_default();

        for scope_spans in &resource_spans.scope_spans {
            stats.scope_spans_count += 1;
            for span in &scope_spans.spans {
                stats.span_count += 1;
                records.push(walk_span(span, &service, &resource_observations));
            }
        }
    }

    (records, stats)
}

fn walk_span(span: &Span, service: &str, resource_observations: &[KeyObservation]) -> SpanRecord {
    let mut attribute_observations = extract_keyvalues(&span.attributes, Scope::Attribute);

    let mut event_names = Vec::with_capacity(span.events.len());
    for event in &span.events {
        event_names.push(event.name.clone());
        attribute_observations.extend(extract_keyvalues(
            &event.attributes,
            Scope::Event(event.name.clone()),
        ));
    }

    for link in &span.links {
        attribute_observations.extend(extract_keyvalues(&link.attributes, Scope::Link));
    }

    SpanRecord {
        name: span.name.clone(),
        kind: span_kind(span.kind),
        status_code: span
            .status
            .as_ref()
            .map(|s| status_code(s.code))
            .unwrap_or(StatusCode::Unset),
        service: service.to_string(),
        resource_observations: resource_observations.to_vec(),
        attribute_observations,
        event_names,
        has_links: !span.links.is_empty(),
        dropped_attributes_count: span.dropped_attributes_count,
        dropped_events_count: span.dropped_events_count,
        dropped_links_count: span.dropped_links_count,
    }
}

fn span_kind(raw: i32) -> SpanKind {
    match span::SpanKind::try_from(raw).unwrap_or(span::SpanKind::Unspecified) {
        span::SpanKind::Unspecified => SpanKind::Unspecified,
        span::SpanKind::Internal => SpanKind::Internal,
        span::SpanKind::Server => SpanKind::Server,
        span::SpanKind::Client => SpanKind::Client,
        span::SpanKind::Producer => SpanKind::Producer,
        span::SpanKind::Consumer => SpanKind::Consumer,
    }
}

fn status_code(raw: i32) -> StatusCode {
    match status::StatusCode::try_from(raw).unwrap_or(status::StatusCode::Unset) {
        status::StatusCode::Unset => StatusCode::Unset,
        status::StatusCode::Ok => StatusCode::Ok,
        status::StatusCode::Error => StatusCode::Error,
    }
}

/// Apply the same pre-masking regex as the log clusterer (§9 OQ3) to a span
/// name, producing the span-name template used by `SpanNamePattern`
/// (§4.D.6). Pure substitution, no Drain tree.
pub fn templatize_span_name(name: &str) -> String {
    crate::templates::premask::mask(name)
}
