//! Key extraction for OTLP metrics (§4.A): walks an
//! `ExportMetricsServiceRequest` and emits one [`MetricRecord`] per data
//! point, across all five metric shapes.

use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::metrics::v1::{metric::Data, Metric};

use crate::entities::{MetricType, Scope};
use crate::otlp::common::{extract_keyvalues, service_name, KeyObservation};

/// One metric data point's worth of extracted schema information.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub name: String,
    pub metric_type: MetricType,
    pub unit: String,
    pub description: String,
    pub service: String,
    pub resource_observations: Vec<KeyObservation>,
    pub label_observations: Vec<KeyObservation>,
}

/// Walk-level counters, analogous to the reference crate's `MetricsMetadata`.
#[derive(Debug, Clone, Default)]
pub struct MetricsWalkStats {
    pub resource_metrics_count: usize,
    pub scope_metrics_count: usize,
    pub gauge_count: usize,
    pub sum_count: usize,
    pub histogram_count: usize,
    pub exponential_histogram_count: usize,
    pub summary_count: usize,
    /// Metrics with an unset `data` oneof; recorded, not fatal (§4.A).
    pub malformed_count: usize,
}

/// Walk a decoded metrics export request, returning one record per data
/// point plus aggregate walk statistics.
pub fn walk(request: &ExportMetricsServiceRequest) -> (Vec<MetricRecord>, MetricsWalkStats) {
    let mut records = Vec::new();
    let mut stats = MetricsWalkStats::default();

    for resource_metrics in &request.resource_metrics {
        stats.resource_metrics_count += 1;
        let service = service_name(resource_metrics.resource.as_ref());
        let resource_observations = resource_metrics
            .resource
            .as_ref()
            .map(|r| extract_keyvalues(&r.attributes, Scope::Resource))
            .unwrap_or_default();

        for scope_metrics in &resource_metrics.scope_metrics {
            stats.scope_metrics_count += 1;
            for metric in &scope_metrics.metrics {
                walk_metric(
                    metric,
                    &service,
                    &resource_observations,
                    &mut records,
                    &mut stats,
                );
            }
        }
    }

    (records, stats)
}

fn walk_metric(
    metric: &Metric,
    service: &str,
    resource_observations: &[KeyObservation],
    records: &mut Vec<MetricRecord>,
    stats: &mut MetricsWalkStats,
) {
    let Some(data) = metric.data.as_ref() else {
        stats.malformed_count += 1;
        return;
    };

    let (metric_type, attr_sets): (MetricType, Vec<&[KeyValue]>) = match data {
        Data::Gauge(g) => {
            stats.gauge_count += 1;
            (
                MetricType::Gauge,
                g.data_points.iter().map(|p| p.attributes.as_slice()).collect(),
            )
        }
        Data::Sum(s) => {
            stats.sum_count += 1;
            (
                MetricType::Sum,
                s.data_points.iter().map(|p| p.attributes.as_slice()).collect(),
            )
        }
        Data::Histogram(h) => {
            stats.histogram_count += 1;
            (
                MetricType::Histogram,
                h.data_points.iter().map(|p| p.attributes.as_slice()).collect(),
            )
        }
        Data::ExponentialHistogram(e) => {
            stats.exponential_histogram_count += 1;
            (
                MetricType::ExponentialHistogram,
                e.data_points.iter().map(|p| p.attributes.as_slice()).collect(),
            )
        }
        Data::Summary(s) => {
            stats.summary_count += 1;
            (
                MetricType::Summary,
                s.data_points.iter().map(|p| p.attributes.as_slice()).collect(),
            )
        }
    };

    for attrs in attr_sets {
        records.push(MetricRecord {
            name: metric.name.clone(),
            metric_type,
            unit: metric.unit.clone(),
            description: metric.description.clone(),
            service: service.to_string(),
            resource_observations: resource_observations.to_vec(),
            label_observations: extract_keyvalues(attrs, Scope::Attribute),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue};
    use opentelemetry_proto::tonic::metrics::v1::{
        number_data_point, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
    };
    use opentelemetry_proto::tonic::resource::v1::Resource;

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(Value::StringValue(value.to_string())),
            }),
        }
    }

    fn sum_metric(name: &str, attrs: Vec<KeyValue>) -> Metric {
        Metric {
            name: name.to_string(),
            description: String::new(),
            unit: String::new(),
            metadata: Vec::new(),
            data: Some(Data::Sum(Sum {
                data_points: vec![NumberDataPoint {
                    attributes: attrs,
                    start_time_unix_nano: 0,
                    time_unix_nano: 0,
                    exemplars: Vec::new(),
                    flags: 0,
                    value: Some(number_data_point::Value::AsInt(1)),
                }],
                aggregation_temporality: 0,
                is_monotonic: true,
            })),
        }
    }

    #[test]
    fn walk_emits_one_record_per_data_point() {
        let request = ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Some(Resource {
                    attributes: vec![kv("service.name", "web")],
                    dropped_attributes_count: 0,
                }),
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![sum_metric(
                        "http_requests_total",
                        vec![kv("method", "GET"), kv("status", "200")],
                    )],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };

        let (records, stats) = walk(&request);
        assert_eq!(records.len(), 1);
        assert_eq!(stats.sum_count, 1);
        let record = &records[0];
        assert_eq!(record.name, "http_requests_total");
        assert_eq!(record.service, "web");
        assert_eq!(record.label_observations.len(), 2);
    }

    #[test]
    fn unset_data_oneof_is_malformed_not_fatal() {
        let request = ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    scope: None,
                    metrics: vec![Metric {
                        name: "broken".to_string(),
                        description: String::new(),
                        unit: String::new(),
                        metadata: Vec::new(),
                        data: None,
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };

        let (records, stats) = walk(&request);
        assert!(records.is_empty());
        assert_eq!(stats.malformed_count, 1);
    }
}
