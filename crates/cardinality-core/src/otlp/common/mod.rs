//! Shared OTLP extraction helpers (§4.A): resource `service.name` lookup and
//! key/value enumeration, common to the metrics/traces/logs walkers.

use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::resource::v1::Resource;

use crate::entities::Scope;
use crate::value_canon;

/// One (scope, key, canonicalized value) observation emitted by a walker,
/// ready for the aggregator to feed into the key map / HLL / catalog.
#[derive(Debug, Clone)]
pub struct KeyObservation {
    pub scope: Scope,
    pub key: String,
    pub canonical_value: Option<String>,
}

/// Extract `(scope, key, value)` observations from a flat attribute list.
pub fn extract_keyvalues(attrs: &[KeyValue], scope: Scope) -> Vec<KeyObservation> {
    attrs
        .iter()
        .map(|kv| KeyObservation {
            scope: scope.clone(),
            key: kv.key.clone(),
            canonical_value: kv
                .value
                .as_ref()
                .and_then(value_canon::canonicalize),
        })
        .collect()
}

/// `service.name` from the resource's attributes, defaulting to `"unknown"`
/// per §4.A when absent or empty.
pub fn service_name(resource: Option<&Resource>) -> String {
    resource
        .and_then(|r| r.attributes.iter().find(|kv| kv.key == "service.name"))
        .and_then(|kv| kv.value.as_ref())
        .and_then(value_canon::canonicalize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue};

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(Value::StringValue(value.to_string())),
            }),
        }
    }

    #[test]
    fn missing_resource_defaults_to_unknown() {
        assert_eq!(service_name(None), "unknown");
    }

    #[test]
    fn missing_service_name_attribute_defaults_to_unknown() {
        let resource = Resource {
            attributes: vec![kv("env", "prod")],
            dropped_attributes_count: 0,
        };
        assert_eq!(service_name(Some(&resource)), "unknown");
    }

    #[test]
    fn service_name_is_read_from_resource_attributes() {
        let resource = Resource {
            attributes: vec![kv("service.name", "web")],
            dropped_attributes_count: 0,
        };
        assert_eq!(service_name(Some(&resource)), "web");
    }

    #[test]
    fn extract_keyvalues_tags_scope() {
        let attrs = vec![kv("method", "GET")];
        let observations = extract_keyvalues(&attrs, Scope::Attribute);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].key, "method");
        assert_eq!(observations[0].canonical_value.as_deref(), Some("GET"));
    }
}
