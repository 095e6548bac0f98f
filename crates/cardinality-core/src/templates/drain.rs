//! Online Drain-style log-template clusterer (§4.C).
//!
//! First-level partition by token count, then a fixed-depth prefix tree
//! keyed on the first `max_depth` token values: each position routes to
//! an exact-match child when one exists, otherwise to a wildcard child,
//! tie-broken toward the literal child. The node a log's prefix resolves
//! to holds a bounded list of candidate clusters matched by token-position
//! similarity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::premask::mask;

const WILDCARD: &str = "<*>";

/// One accepted template and its observed statistics.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub tokens: Vec<String>,
    pub count: u64,
    pub example: String,
    pub last_matched: DateTime<Utc>,
}

impl Cluster {
    pub fn template(&self) -> String {
        self.tokens.join(" ")
    }
}

#[derive(Default)]
struct Leaf {
    clusters: Vec<Cluster>,
}

impl Leaf {
    /// Find the best-matching cluster above `sim_threshold`, preferring
    /// higher similarity and, on ties, the larger (more popular) cluster.
    fn best_match(&self, tokens: &[String], sim_threshold: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, cluster) in self.clusters.iter().enumerate() {
            if cluster.tokens.len() != tokens.len() {
                continue;
            }
            let sim = similarity(&cluster.tokens, tokens);
            if sim < sim_threshold {
                continue;
            }
            match best {
                None => best = Some((idx, sim)),
                Some((best_idx, best_sim)) => {
                    let better = sim > best_sim
                        || (sim == best_sim
                            && self.clusters[idx].count > self.clusters[best_idx].count);
                    if better {
                        best = Some((idx, sim));
                    }
                }
            }
        }
        best.map(|(idx, _)| idx)
    }
}

fn similarity(template: &[String], tokens: &[String]) -> f64 {
    debug_assert_eq!(template.len(), tokens.len());
    if template.is_empty() {
        return 1.0;
    }
    let matches = template
        .iter()
        .zip(tokens.iter())
        .filter(|(t, tok)| t.as_str() == WILDCARD || t == tok)
        .count();
    matches as f64 / template.len() as f64
}

/// One internal position of the fixed-depth prefix tree. A node routes a
/// token to an exact-match child if one exists, else to the wildcard
/// child if one has already been opened at this position, else it opens
/// a literal child for the first token ever seen here -- and only once a
/// second, different token arrives at an already-literal-only position
/// does that position get promoted to a wildcard child, so a position
/// that has only ever seen one literal value stays literal instead of
/// fragmenting into new leaves on its first divergence.
#[derive(Default)]
struct Node {
    literal_children: HashMap<String, Node>,
    wildcard_child: Option<Box<Node>>,
    leaf: Leaf,
}

impl Node {
    fn child(&mut self, token: &str) -> &mut Node {
        if self.literal_children.contains_key(token) {
            return self.literal_children.get_mut(token).unwrap();
        }
        if self.wildcard_child.is_some() {
            return self.wildcard_child.as_mut().unwrap();
        }
        if self.literal_children.is_empty() {
            return self.literal_children.entry(token.to_string()).or_default();
        }
        self.wildcard_child.get_or_insert_with(|| Box::new(Node::default()))
    }

    fn collect_clusters<'a>(&'a self, out: &mut Vec<&'a Cluster>) {
        out.extend(self.leaf.clusters.iter());
        for child in self.literal_children.values() {
            child.collect_clusters(out);
        }
        if let Some(wildcard) = &self.wildcard_child {
            wildcard.collect_clusters(out);
        }
    }
}

/// A single (service, severity)-scoped Drain instance. Owned by one shard;
/// callers must already have routed to the right shard before calling in.
pub struct DrainTree {
    max_depth: usize,
    max_clusters: usize,
    sim_threshold: f64,
    // first-level partition by token count, then the fixed-depth prefix tree
    roots: HashMap<usize, Node>,
}

impl DrainTree {
    pub fn new(max_depth: usize, max_clusters: usize, sim_threshold: f64) -> Self {
        Self {
            max_depth: max_depth.max(1),
            max_clusters: max_clusters.max(1),
            sim_threshold,
            roots: HashMap::new(),
        }
    }

    /// Tokenize, pre-mask, and match/insert `raw` into the tree, returning
    /// the accepted template. `now` is the observation timestamp.
    pub fn observe(&mut self, raw: &str, now: DateTime<Utc>) -> String {
        let masked = mask(raw);
        let tokens: Vec<String> = masked.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            return String::new();
        }

        let prefix_len = self.max_depth.min(tokens.len());
        let mut node = self.roots.entry(tokens.len()).or_default();
        for token in &tokens[..prefix_len] {
            node = node.child(token);
        }
        let leaf = &mut node.leaf;

        if let Some(idx) = leaf.best_match(&tokens, self.sim_threshold) {
            let cluster = &mut leaf.clusters[idx];
            for (slot, incoming) in cluster.tokens.iter_mut().zip(tokens.iter()) {
                if slot != incoming {
                    *slot = WILDCARD.to_string();
                }
            }
            cluster.count += 1;
            cluster.last_matched = now;
            return cluster.template();
        }

        let template = tokens.clone();
        if leaf.clusters.len() >= self.max_clusters {
            evict_least_recently_matched(&mut leaf.clusters);
        }
        leaf.clusters.push(Cluster {
            tokens: template.clone(),
            count: 1,
            example: raw.to_string(),
            last_matched: now,
        });
        template.join(" ")
    }

    pub fn clusters(&self) -> Vec<&Cluster> {
        let mut out = Vec::new();
        for root in self.roots.values() {
            root.collect_clusters(&mut out);
        }
        out
    }
}

fn evict_least_recently_matched(clusters: &mut Vec<Cluster>) {
    if let Some((idx, _)) = clusters
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.last_matched)
    {
        tracing::debug!(index = idx, "evicting least-recently-matched drain cluster");
        clusters.remove(idx);
    }
}
