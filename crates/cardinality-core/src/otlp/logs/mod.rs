//! Key extraction for OTLP logs (§4.A): walks an `ExportLogsServiceRequest`
//! and emits one [`LogRecord`] per record, with the body text handed off
//! separately for the clusterer (§4.C) rather than canonicalized as a value.

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::logs::v1::LogRecord as OtlpLogRecord;

use crate::entities::{normalize_severity_text, Scope};
use crate::otlp::common::{extract_keyvalues, service_name, KeyObservation};
use crate::value_canon;

/// One log record's worth of extracted schema information.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub severity_text: String,
    pub severity_number: i32,
    pub service: String,
    pub resource_observations: Vec<KeyObservation>,
    pub attribute_observations: Vec<KeyObservation>,
    /// Raw body text, if the body is (or coerces to) a string. Fed to the
    /// Drain clusterer, never stored as a canonicalized attribute value.
    pub body_text: Option<String>,
    pub has_trace_context: bool,
    pub has_span_context: bool,
    pub dropped_attributes_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LogsWalkStats {
    pub resource_logs_count: usize,
    pub scope_logs_count: usize,
    pub log_record_count: usize,
}

pub fn walk(request: &ExportLogsServiceRequest) -> (Vec<LogRecord>, LogsWalkStats) {
    let mut records = Vec::new();
    let mut stats = LogsWalkStats::default();

    for resource_logs in &request.resource_logs {
        stats.resource_logs_count += 1;
        let service = service_name(resource_logs.resource.as_ref());
        let resource_observations = resource_logs
            .resource
            .as_ref()
            .map(|r| extract_keyvalues(&r.attributes, Scope::Resource))
            .unwrap_or_default();

        for scope_logs in &resource_logs.scope_logs {
            stats.scope_logs_count += 1;
            for log_record in &scope_logs.log_records {
                stats.log_record_count += 1;
                records.push(walk_log_record(log_record, &service, &resource_observations));
            }
        }
    }

    (records, stats)
}

fn walk_log_record(
    log_record: &OtlpLogRecord,
    service: &str,
    resource_observations: &[KeyObservation],
) -> LogRecord {
    let attribute_observations = extract_keyvalues(&log_record.attributes, Scope::Attribute);

    let body_text = log_record
        .body
        .as_ref()
        .and_then(value_canon::canonicalize);

    LogRecord {
        severity_text: normalize_severity_text(&log_record.severity_text),
        severity_number: log_record.severity_number,
        service: service.to_string(),
        resource_observations: resource_observations.to_vec(),
        attribute_observations,
        body_text,
        has_trace_context: !log_record.trace_id.is_empty(),
        has_span_context: !log_record.span_id.is_empty(),
        dropped_attributes_count: log_record.dropped_attributes_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::logs::v1::{ResourceLogs, ScopeLogs};
    use opentelemetry_proto::tonic::resource::v1::Resource;

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(Value::StringValue(value.to_string())),
            }),
        }
    }

    fn log(severity_text: &str, trace_id: Vec<u8>, body: &str) -> OtlpLogRecord {
        OtlpLogRecord {
            time_unix_nano: 0,
            observed_time_unix_nano: 0,
            severity_number: 0,
            severity_text: severity_text.to_string(),
            body: Some(AnyValue {
                value: Some(Value::StringValue(body.to_string())),
            }),
            attributes: vec![kv("http.method", "GET")],
            dropped_attributes_count: 0,
            flags: 0,
            trace_id,
            span_id: Vec::new(),
            event_name: String::new(),
        }
    }

    #[test]
    fn missing_severity_text_normalizes_to_unset() {
        let request = ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Some(Resource {
                    attributes: vec![kv("service.name", "web")],
                    dropped_attributes_count: 0,
                }),
                scope_logs: vec![ScopeLogs {
                    scope: None,
                    log_records: vec![log("", Vec::new(), "boot complete")],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };

        let (records, stats) = walk(&request);
        assert_eq!(stats.log_record_count, 1);
        assert_eq!(records[0].severity_text, "UNSET");
        assert!(!records[0].has_trace_context);
        assert_eq!(records[0].body_text.as_deref(), Some("boot complete"));
    }

    #[test]
    fn trace_id_presence_sets_has_trace_context() {
        let request = ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: None,
                scope_logs: vec![ScopeLogs {
                    scope: None,
                    log_records: vec![log("ERROR", vec![1; 16], "oops")],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };

        let (records, _) = walk(&request);
        assert!(records[0].has_trace_context);
    }
}
