//! Cross-cutting properties from SPEC_FULL.md §8 not already exercised by
//! the scenario tests or a module's own unit tests: per-key counts never
//! exceed their entity's total, merge is associative and self-idempotent
//! under doubling, HLL merge is associative, template idempotence holds,
//! and empty required names are rejected before any state changes.

use cardinality_core::entities::{KeyMetadata, MetricMetadata};
use cardinality_core::error::CoreError;
use cardinality_core::store::MemoryStore;
use cardinality_core::templates::drain::DrainTree;
use cardinality_core::AnalyzerConfig;
use chrono::{DateTime, Utc};

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn metric_with_label(name: &str, service: &str, label_value: &str) -> MetricMetadata {
    let mut m = MetricMetadata::new(name.to_string(), now());
    m.total_sample_count = 1;
    m.per_service_counts.insert(service.to_string(), 1);
    let mut key = KeyMetadata::new(14, 10);
    key.observe(label_value);
    m.label_keys.insert("method".to_string(), key);
    m
}

/// Invariant 2: a key's observation count never exceeds its entity's total.
#[test]
fn key_count_never_exceeds_entity_total() {
    let mut a = metric_with_label("http_requests_total", "web", "GET");
    let b = metric_with_label("http_requests_total", "web", "POST");
    let c = metric_with_label("http_requests_total", "web", "PUT");
    a.merge(b);
    a.merge(c);

    assert_eq!(a.total_sample_count, 3);
    for key in a.label_keys.values() {
        assert!(key.count <= a.total_sample_count);
    }
}

/// Invariant 9: entity merge is associative regardless of grouping.
#[test]
fn metric_merge_is_associative() {
    let a = metric_with_label("http_requests_total", "web", "GET");
    let b = metric_with_label("http_requests_total", "web", "POST");
    let c = metric_with_label("http_requests_total", "web", "PUT");

    let mut left = a.clone();
    left.merge(b.clone());
    left.merge(c.clone());

    let mut bc = b;
    bc.merge(c);
    let mut right = a;
    right.merge(bc);

    assert_eq!(left.total_sample_count, right.total_sample_count);
    assert_eq!(left.per_service_counts, right.per_service_counts);
    assert_eq!(left.label_keys["method"].count, right.label_keys["method"].count);
    assert_eq!(
        left.label_keys["method"].estimated_cardinality(),
        right.label_keys["method"].estimated_cardinality()
    );
}

/// Invariant 10: merging an entity with an identical copy of itself doubles
/// its counts while leaving its key set and HLL estimate unchanged.
#[test]
fn merging_entity_with_itself_doubles_counts_not_cardinality() {
    let original = metric_with_label("http_requests_total", "web", "GET");
    let mut doubled = original.clone();
    doubled.merge(original.clone());

    assert_eq!(doubled.total_sample_count, 2 * original.total_sample_count);
    assert_eq!(doubled.per_service_counts["web"], 2 * original.per_service_counts["web"]);
    assert_eq!(doubled.label_keys.keys().count(), original.label_keys.keys().count());
    assert_eq!(
        doubled.label_keys["method"].estimated_cardinality(),
        original.label_keys["method"].estimated_cardinality()
    );
    assert_eq!(doubled.first_seen, original.first_seen);
    assert_eq!(doubled.last_seen, original.last_seen);
}

/// Invariant 11: HLL merge (transitively, via KeyMetadata merge) is
/// associative, mirroring the already-tested commutativity in hll.rs.
#[test]
fn key_metadata_merge_is_associative() {
    let mut a = KeyMetadata::new(12, 10);
    for i in 0..50 {
        a.observe(&format!("a-{i}"));
    }
    let mut b = KeyMetadata::new(12, 10);
    for i in 0..50 {
        b.observe(&format!("b-{i}"));
    }
    let mut c = KeyMetadata::new(12, 10);
    for i in 0..50 {
        c.observe(&format!("c-{i}"));
    }

    let mut left = a.clone();
    left.merge(&b);
    left.merge(&c);

    let mut bc = b;
    bc.merge(&c);
    let mut right = a;
    right.merge(&bc);

    assert_eq!(left.estimated_cardinality(), right.estimated_cardinality());
    assert_eq!(left.count, right.count);
}

/// Invariant 7: re-clustering an already-templated body never mutates the
/// accepted template or spawns a second cluster.
#[test]
fn template_idempotence_on_already_templated_body() {
    let mut tree = DrainTree::new(4, 100, 0.7);
    let first = tree.observe("user 1 failed login", now());
    assert_eq!(first, "user <*> failed login");

    let second = tree.observe(&first, now());
    assert_eq!(second, "user <*> failed login");

    let clusters: Vec<_> = tree.clusters().collect();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].count, 2);
}

/// Invariant 12: storing a metric with an empty name is rejected and
/// creates no entity.
#[test]
fn storing_metric_with_empty_name_is_rejected() {
    let store = MemoryStore::new(AnalyzerConfig::default());
    let result = store.store_metric(MetricMetadata::new(String::new(), now()));
    assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
    assert!(store.get_metric("").is_err());
}
