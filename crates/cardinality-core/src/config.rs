//! Structural configuration for the analyzer pipeline (§6).
//!
//! This is plain data with sane defaults; `cardinality-config` is
//! responsible for layering it from environment variables and config
//! files before handing it to [`crate::store::MemoryStore::new`].

use serde::{Deserialize, Serialize};

/// Knobs for the cardinality sketches, the log-template clusterer, and the
/// value-sample buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Enable the log-body clusterer. When `false`, `BodyTemplates` stays empty.
    pub auto_template: bool,
    /// Number of independent Drain shards, hashed on `service.name + severity`.
    pub shards: usize,
    /// Minimum similarity (fraction of matching token positions) to join a cluster.
    pub sim_threshold: f64,
    /// Depth of the fixed prefix tree before falling into a leaf's cluster list.
    pub max_depth: usize,
    /// Maximum candidate clusters retained per leaf before the LRU one is evicted.
    pub max_clusters: usize,
    /// HyperLogLog precision (number of registers = 2^precision).
    pub hll_precision: u8,
    /// Maximum number of distinct raw value samples retained per key.
    pub value_sample_cap: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            auto_template: true,
            shards: 4,
            sim_threshold: 0.7,
            max_depth: 4,
            max_clusters: 100,
            hll_precision: 14,
            value_sample_cap: 10,
        }
    }
}

impl AnalyzerConfig {
    /// Validate the configuration, returning a description of the first
    /// violation encountered.
    pub fn validate(&self) -> Result<(), String> {
        if self.shards == 0 {
            return Err("shards must be >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.sim_threshold) {
            return Err("sim_threshold must be in [0, 1]".to_string());
        }
        if self.max_depth == 0 {
            return Err("max_depth must be >= 1".to_string());
        }
        if self.max_clusters == 0 {
            return Err("max_clusters must be >= 1".to_string());
        }
        if !(10..=16).contains(&self.hll_precision) {
            return Err("hll_precision must be in [10, 16]".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalyzerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_precision() {
        let mut cfg = AnalyzerConfig::default();
        cfg.hll_precision = 20;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_shards() {
        let mut cfg = AnalyzerConfig::default();
        cfg.shards = 0;
        assert!(cfg.validate().is_err());
    }
}
