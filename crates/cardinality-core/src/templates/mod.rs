//! Log-template clustering (§4.C): a bank of independent, shardable Drain
//! trees plus the shared pre-masking regex also used for span-name
//! templating (§4.D.6).

pub mod drain;
pub mod premask;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::value_canon::stable_hash64;
use drain::DrainTree;

/// A bank of `shards` independent [`DrainTree`]s, one logical tree per
/// `service.name + severity` pair, routed by a stable hash so concurrent
/// ingests for different keys never contend on the same shard's lock
/// (the caller holds the per-shard lock; this type itself is not
/// thread-safe on its own, matching the HLL sketch's contract).
pub struct ShardedClusterer {
    max_depth: usize,
    max_clusters: usize,
    sim_threshold: f64,
    shard_count: usize,
    // one DrainTree per (shard index, service, severity) triple observed so far
    trees: Vec<HashMap<(String, String), DrainTree>>,
}

impl ShardedClusterer {
    pub fn new(shard_count: usize, max_depth: usize, max_clusters: usize, sim_threshold: f64) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            max_depth,
            max_clusters,
            sim_threshold,
            shard_count,
            trees: (0..shard_count).map(|_| HashMap::new()).collect(),
        }
    }

    pub fn shard_for(&self, service: &str, severity: &str) -> usize {
        let mut key = Vec::with_capacity(service.len() + severity.len() + 1);
        key.extend_from_slice(service.as_bytes());
        key.push(0);
        key.extend_from_slice(severity.as_bytes());
        (stable_hash64(&key) as usize) % self.shard_count
    }

    /// Cluster `body` under `(service, severity)`, returning the accepted
    /// template string.
    pub fn observe(&mut self, service: &str, severity: &str, body: &str, now: DateTime<Utc>) -> String {
        let shard = self.shard_for(service, severity);
        let max_depth = self.max_depth;
        let max_clusters = self.max_clusters;
        let sim_threshold = self.sim_threshold;
        let tree = self.trees[shard]
            .entry((service.to_string(), severity.to_string()))
            .or_insert_with(|| DrainTree::new(max_depth, max_clusters, sim_threshold));
        tree.observe(body, now)
    }

    /// Snapshot the current clusters for `(service, severity)`, sorted by
    /// match count descending (outputs-to-D, §4.C).
    pub fn templates_for(&self, service: &str, severity: &str) -> Vec<drain::Cluster> {
        let shard = self.shard_for(service, severity);
        let key = (service.to_string(), severity.to_string());
        let mut clusters: Vec<drain::Cluster> = self.trees[shard]
            .get(&key)
            .map(|tree| tree.clusters().into_iter().cloned().collect())
            .unwrap_or_default();
        clusters.sort_by(|a, b| b.count.cmp(&a.count));
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn different_severities_cluster_independently() {
        let mut clusterer = ShardedClusterer::new(4, 4, 100, 0.7);
        for i in 0..1000 {
            clusterer.observe("api", "ERROR", &format!("user {i} failed login"), now());
        }
        for _ in 0..10 {
            clusterer.observe("api", "ERROR", "db timeout after 50ms", now());
        }

        let templates = clusterer.templates_for("api", "ERROR");
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].template(), "user <*> failed login");
        assert_eq!(templates[0].count, 1000);
        assert_eq!(templates[1].template(), "db timeout after <*>");
        assert_eq!(templates[1].count, 10);
    }

    #[test]
    fn same_service_different_severity_is_independent_state() {
        let mut clusterer = ShardedClusterer::new(4, 4, 100, 0.7);
        clusterer.observe("api", "INFO", "request completed", now());
        clusterer.observe("api", "ERROR", "request failed", now());
        assert_eq!(clusterer.templates_for("api", "INFO").len(), 1);
        assert_eq!(clusterer.templates_for("api", "ERROR").len(), 1);
    }
}
