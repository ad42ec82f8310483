//! TrustGraph (§4.2): the single source of truth for trust-edge topology.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::model::TrustSignal;

/// Sentinel hop distance for unknown/beyond-horizon keys (§4.2, SPEC §2).
pub const UNREACHABLE_HOPS: u32 = 999;

#[derive(Debug, Clone)]
pub struct TrustGraphConfig {
    pub max_hops: u32,
    /// Open Question (b): whether receiving a revocation from a peer we
    /// currently trust reciprocally revokes them. Defaults to `true`,
    /// preserving the source's unconditional behavior (SPEC_FULL §2).
    pub reciprocate_revocations: bool,
}

impl Default for TrustGraphConfig {
    fn default() -> Self {
        Self { max_hops: 3, reciprocate_revocations: true }
    }
}

/// One (hops, weight, oldest-edge-timestamp) result from `find_trust_paths`.
/// `weight` is the raw product of per-edge weights along the path;
/// `ReputationEngine` applies the base-by-length and temporal-decay
/// factors on top (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct TrustPath {
    pub hops: u32,
    pub weight: f64,
    pub oldest_edge_timestamp: u64,
}

struct Inner {
    adjacency: HashMap<String, HashMap<String, Option<TrustSignal>>>,
    hop_cache: HashMap<String, u32>,
}

/// A callback fired whenever `add_edge` records a genuinely new edge,
/// for ports that want to persist the trust graph incrementally.
pub type EdgeObserver = Box<dyn Fn(&str, &str, Option<&TrustSignal>) + Send + Sync>;

pub struct TrustGraph {
    self_key: String,
    config: TrustGraphConfig,
    inner: RwLock<Inner>,
    on_edge: Option<EdgeObserver>,
}

impl TrustGraph {
    pub fn new(self_key: String, config: TrustGraphConfig) -> Self {
        let mut hop_cache = HashMap::new();
        hop_cache.insert(self_key.clone(), 0);
        Self {
            self_key,
            config,
            inner: RwLock::new(Inner { adjacency: HashMap::new(), hop_cache }),
            on_edge: None,
        }
    }

    pub fn with_edge_observer(mut self, observer: EdgeObserver) -> Self {
        self.on_edge = Some(observer);
        self
    }

    pub fn config(&self) -> &TrustGraphConfig {
        &self.config
    }

    /// 0 for self, cached distance for anything reachable, `UNREACHABLE_HOPS`
    /// otherwise. O(1).
    pub fn hop_distance(&self, key: &str) -> u32 {
        if key == self.self_key {
            return 0;
        }
        *self.inner.read().hop_cache.get(key).unwrap_or(&UNREACHABLE_HOPS)
    }

    pub fn is_within_horizon(&self, key: &str) -> bool {
        self.hop_distance(key) <= self.config.max_hops
    }

    /// Incrementally extend the adjacency list. Drops the edge if
    /// `signal.revoked`; otherwise records (or replaces) it, then
    /// propagates cache updates outward from `trustee` while
    /// `d+1 < maxHops` (§4.2).
    pub fn add_edge(&self, truster: &str, trustee: &str, signal: Option<TrustSignal>) {
        let revoked = signal.as_ref().is_some_and(|s| s.revoked);
        {
            let mut inner = self.inner.write();
            if revoked {
                if let Some(edges) = inner.adjacency.get_mut(truster) {
                    edges.remove(trustee);
                }
            } else {
                inner.adjacency.entry(truster.to_string()).or_default().insert(trustee.to_string(), signal.clone());
            }
        }
        if let Some(observer) = &self.on_edge {
            observer(truster, trustee, signal.as_ref());
        }
        if revoked {
            return;
        }
        let truster_distance = self.hop_distance(truster);
        if truster_distance < self.config.max_hops {
            self.propagate_distance(trustee, truster_distance + 1);
        }
    }

    fn propagate_distance(&self, key: &str, candidate: u32) {
        let should_recurse = {
            let mut inner = self.inner.write();
            let current = inner.hop_cache.get(key).copied().unwrap_or(UNREACHABLE_HOPS);
            if candidate < current {
                inner.hop_cache.insert(key.to_string(), candidate);
                true
            } else {
                false
            }
        };
        if !should_recurse || candidate + 1 >= self.config.max_hops {
            return;
        }
        let neighbors: Vec<String> = self.inner.read().adjacency.get(key).map(|m| m.keys().cloned().collect()).unwrap_or_default();
        for neighbor in neighbors {
            self.propagate_distance(&neighbor, candidate + 1);
        }
    }

    /// Reset the distance-1 set to exactly `trust_set`, reseed the cache,
    /// then rewalk known edges so downstream distances reflect the new
    /// direct set (§4.2).
    pub fn update_direct_trust(&self, trust_set: &HashSet<String>) {
        {
            let mut inner = self.inner.write();
            inner.hop_cache.clear();
            inner.hop_cache.insert(self.self_key.clone(), 0);
            for key in trust_set {
                inner.hop_cache.insert(key.clone(), 1);
            }
        }
        for key in trust_set {
            self.propagate_distance(key, 1);
        }
    }

    /// BFS/DFS from the synthetic self node, collecting every simple path
    /// (no node repeats within one path) to `target` within `depth_limit`
    /// hops. Uses a per-path visited set, not a global one, so distinct
    /// paths through a shared intermediate node are not pruned (§4.2).
    pub fn find_trust_paths(&self, target: &str, depth_limit: u32) -> Vec<TrustPath> {
        let inner = self.inner.read();
        let mut results = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(self.self_key.clone());
        Self::walk(&inner.adjacency, &self.self_key, target, depth_limit, 1.0, u64::MAX, 0, &mut visited, &mut results);
        results
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        adjacency: &HashMap<String, HashMap<String, Option<TrustSignal>>>,
        current: &str,
        target: &str,
        depth_limit: u32,
        weight_acc: f64,
        oldest_ts: u64,
        depth: u32,
        visited: &mut HashSet<String>,
        results: &mut Vec<TrustPath>,
    ) {
        let Some(neighbors) = adjacency.get(current) else { return };
        for (trustee, signal) in neighbors {
            if visited.contains(trustee) {
                continue;
            }
            let edge_weight = signal.as_ref().map(|s| s.weight).unwrap_or(1.0);
            let edge_timestamp = signal.as_ref().map(|s| s.timestamp).unwrap_or(0);
            let next_weight = weight_acc * edge_weight;
            let next_oldest = oldest_ts.min(edge_timestamp);
            let next_depth = depth + 1;

            if trustee == target {
                results.push(TrustPath { hops: next_depth, weight: next_weight, oldest_edge_timestamp: next_oldest });
                continue;
            }
            if next_depth < depth_limit {
                visited.insert(trustee.clone());
                Self::walk(adjacency, trustee, target, depth_limit, next_weight, next_oldest, next_depth, visited, results);
                visited.remove(trustee);
            }
        }
    }

    pub fn get_direct_trust(&self, key: &str) -> Option<TrustSignal> {
        self.inner.read().adjacency.get(&self.self_key).and_then(|m| m.get(key)).cloned().flatten()
    }

    pub fn get_neighbors(&self, truster: &str) -> Vec<String> {
        self.inner.read().adjacency.get(truster).map(|m| m.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn get_trust_signal(&self, truster: &str, trustee: &str) -> Option<TrustSignal> {
        self.inner.read().adjacency.get(truster).and_then(|m| m.get(trustee)).cloned().flatten()
    }

    pub fn get_all_trust_signals(&self) -> Vec<TrustSignal> {
        self.inner
            .read()
            .adjacency
            .values()
            .flat_map(|m| m.values())
            .filter_map(|s| s.clone())
            .collect()
    }

    /// `(truster, trustee)` pairs for every known edge, topology-only or
    /// signed, for export to peers.
    pub fn export_adjacency_list(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .adjacency
            .iter()
            .flat_map(|(truster, edges)| edges.keys().map(move |trustee| (truster.clone(), trustee.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(truster: &str, trustee: &str, weight: f64, timestamp: u64) -> TrustSignal {
        TrustSignal {
            truster: truster.to_string(),
            trustee: trustee.to_string(),
            weight,
            revoked: false,
            timestamp,
            attestation: None,
            signature: String::new(),
        }
    }

    #[test]
    fn self_distance_is_zero_and_unknown_is_sentinel() {
        let graph = TrustGraph::new("self".into(), TrustGraphConfig::default());
        assert_eq!(graph.hop_distance("self"), 0);
        assert_eq!(graph.hop_distance("nobody"), UNREACHABLE_HOPS);
    }

    #[test]
    fn direct_edge_sets_distance_one_and_propagates() {
        let graph = TrustGraph::new("self".into(), TrustGraphConfig::default());
        graph.add_edge("self", "bob", Some(signal("self", "bob", 1.0, 1)));
        assert_eq!(graph.hop_distance("bob"), 1);

        graph.add_edge("bob", "carol", Some(signal("bob", "carol", 1.0, 1)));
        assert_eq!(graph.hop_distance("carol"), 2);
    }

    #[test]
    fn revoked_signal_drops_the_edge() {
        let graph = TrustGraph::new("self".into(), TrustGraphConfig::default());
        graph.add_edge("self", "bob", Some(signal("self", "bob", 1.0, 1)));
        assert_eq!(graph.hop_distance("bob"), 1);

        let mut revocation = signal("self", "bob", 1.0, 2);
        revocation.revoked = true;
        graph.add_edge("self", "bob", Some(revocation));
        assert_eq!(graph.get_trust_signal("self", "bob"), None);
    }

    #[test]
    fn propagation_stops_at_max_hops() {
        let graph = TrustGraph::new("self".into(), TrustGraphConfig { max_hops: 2, reciprocate_revocations: true });
        graph.add_edge("self", "a", Some(signal("self", "a", 1.0, 1)));
        graph.add_edge("a", "b", Some(signal("a", "b", 1.0, 1)));
        graph.add_edge("b", "c", Some(signal("b", "c", 1.0, 1)));
        assert_eq!(graph.hop_distance("b"), 2);
        assert_eq!(graph.hop_distance("c"), UNREACHABLE_HOPS);
    }

    #[test]
    fn find_trust_paths_enumerates_distinct_routes() {
        let graph = TrustGraph::new("self".into(), TrustGraphConfig { max_hops: 4, reciprocate_revocations: true });
        // self -> a -> target, and self -> b -> target: two distinct 2-hop paths.
        graph.add_edge("self", "a", Some(signal("self", "a", 0.9, 10)));
        graph.add_edge("self", "b", Some(signal("self", "b", 0.8, 20)));
        graph.add_edge("a", "target", Some(signal("a", "target", 0.7, 30)));
        graph.add_edge("b", "target", Some(signal("b", "target", 0.6, 40)));

        let mut paths = graph.find_trust_paths("target", 4);
        paths.sort_by(|p, q| p.weight.partial_cmp(&q.weight).unwrap());
        assert_eq!(paths.len(), 2);
        assert!((paths[0].weight - (0.8 * 0.6)).abs() < 1e-9);
        assert!((paths[1].weight - (0.9 * 0.7)).abs() < 1e-9);
    }

    #[test]
    fn find_trust_paths_does_not_reuse_a_node_within_one_path() {
        let graph = TrustGraph::new("self".into(), TrustGraphConfig { max_hops: 5, reciprocate_revocations: true });
        graph.add_edge("self", "a", Some(signal("self", "a", 1.0, 1)));
        graph.add_edge("a", "self", Some(signal("a", "self", 1.0, 1)));
        graph.add_edge("a", "target", Some(signal("a", "target", 1.0, 1)));

        let paths = graph.find_trust_paths("target", 5);
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn update_direct_trust_reseeds_distance_one_set() {
        let graph = TrustGraph::new("self".into(), TrustGraphConfig::default());
        graph.add_edge("self", "old", Some(signal("self", "old", 1.0, 1)));
        let mut new_set = HashSet::new();
        new_set.insert("fresh".to_string());
        graph.update_direct_trust(&new_set);
        assert_eq!(graph.hop_distance("fresh"), 1);
        assert_eq!(graph.hop_distance("old"), UNREACHABLE_HOPS);
    }
}
