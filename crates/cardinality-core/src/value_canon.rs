//! Canonicalization of OTLP `AnyValue`s into stable strings for cardinality
//! tracking, plus the single 64-bit hash used everywhere a stable hash is
//! required (HLL register index/rho, Drain shard selection).
//!
//! The canonical form must be identical across processes so HLL sketches
//! built independently stay mergeable: integers are base-10, floats use
//! their shortest round-trip representation, bools are `"true"`/`"false"`,
//! bytes are lowercase hex, and arrays/maps fall back to compact,
//! key-sorted JSON.

use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue, KeyValue};

/// Canonicalize an `AnyValue` to the string fed into the cardinality sketch
/// and value-sample bucket. Returns `None` for an unset oneof (nothing to
/// sample).
pub fn canonicalize(value: &AnyValue) -> Option<String> {
    value.value.as_ref().map(canonicalize_inner)
}

fn canonicalize_inner(value: &Value) -> String {
    match value {
        Value::StringValue(s) => s.clone(),
        Value::BoolValue(b) => if *b { "true" } else { "false" }.to_string(),
        Value::IntValue(i) => i.to_string(),
        Value::DoubleValue(d) => canonicalize_f64(*d),
        Value::BytesValue(b) => hex::encode(b),
        Value::ArrayValue(arr) => {
            let items: Vec<serde_json::Value> = arr
                .values
                .iter()
                .map(|v| match v.value.as_ref() {
                    Some(inner) => json_value(inner),
                    None => serde_json::Value::Null,
                })
                .collect();
            serde_json::Value::Array(items).to_string()
        }
        Value::KvlistValue(kv) => {
            let mut map = serde_json::Map::new();
            for entry in &kv.values {
                map.insert(entry.key.clone(), keyvalue_json(entry));
            }
            serde_json::Value::Object(map).to_string()
        }
    }
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::StringValue(s) => serde_json::Value::String(s.clone()),
        Value::BoolValue(b) => serde_json::Value::Bool(*b),
        Value::IntValue(i) => serde_json::Value::from(*i),
        Value::DoubleValue(d) => {
            serde_json::Number::from_f64(*d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Value::BytesValue(b) => serde_json::Value::String(hex::encode(b)),
        Value::ArrayValue(arr) => serde_json::Value::Array(
            arr.values
                .iter()
                .map(|v| v.value.as_ref().map_or(serde_json::Value::Null, json_value))
                .collect(),
        ),
        Value::KvlistValue(kv) => {
            let mut map = serde_json::Map::new();
            for entry in &kv.values {
                map.insert(entry.key.clone(), keyvalue_json(entry));
            }
            serde_json::Value::Object(map)
        }
    }
}

fn keyvalue_json(entry: &KeyValue) -> serde_json::Value {
    entry
        .value
        .as_ref()
        .and_then(|v| v.value.as_ref())
        .map_or(serde_json::Value::Null, json_value)
}

/// Shortest round-trip decimal representation of a float, matching what
/// Rust's `Display` for `f64` already produces (e.g. `1.5`, not `1.50000`).
fn canonicalize_f64(d: f64) -> String {
    format!("{d}")
}

/// The single 64-bit hash used by the HLL sketch and Drain shard selection.
/// Must stay fixed for the lifetime of a process so sketches stay mergeable
/// across requests; `blake3` is already a dependency of this workspace, so
/// no additional hashing crate is introduced.
pub fn stable_hash64(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let b = digest.as_bytes();
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::ArrayValue;

    fn string_val(s: &str) -> AnyValue {
        AnyValue {
            value: Some(Value::StringValue(s.to_string())),
        }
    }

    #[test]
    fn strings_pass_through() {
        assert_eq!(canonicalize(&string_val("GET")).unwrap(), "GET");
    }

    #[test]
    fn bools_are_literal() {
        let v = AnyValue {
            value: Some(Value::BoolValue(true)),
        };
        assert_eq!(canonicalize(&v).unwrap(), "true");
    }

    #[test]
    fn bytes_are_hex() {
        let v = AnyValue {
            value: Some(Value::BytesValue(vec![0xde, 0xad, 0xbe, 0xef])),
        };
        assert_eq!(canonicalize(&v).unwrap(), "deadbeef");
    }

    #[test]
    fn arrays_are_stable_json() {
        let v = AnyValue {
            value: Some(Value::ArrayValue(ArrayValue {
                values: vec![string_val("a"), string_val("b")],
            })),
        };
        assert_eq!(canonicalize(&v).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn unset_value_has_no_canonical_form() {
        let v = AnyValue { value: None };
        assert_eq!(canonicalize(&v), None);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(stable_hash64(b"hello"), stable_hash64(b"hello"));
        assert_ne!(stable_hash64(b"hello"), stable_hash64(b"world"));
    }
}
