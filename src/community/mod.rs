//! Community detection over the entity subgraph of a group.
//!
//! Weighted Label Propagation: linear-ish cost, no parameter tuning, and a
//! deterministic tie-break, at the cost of not optimizing any modularity
//! score. Cycles in the entity graph are handled natively.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::nodes::entity::EntityNode;
use crate::repo::EdgeRef;

/// Default number of propagation passes before giving up on convergence.
const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Label Propagation community detector.
#[derive(Debug, Clone)]
pub struct LabelPropagation {
    pub max_iterations: usize,
}

impl Default for LabelPropagation {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl LabelPropagation {
    /// Cluster `nodes` by the active edges among them.
    ///
    /// Edges referencing unknown nodes are ignored; both directions collapse
    /// into one undirected adjacency whose weight is the edge count between
    /// the pair. Clusters of fewer than two members are dropped, so isolated
    /// nodes never appear in the output. For a fixed input order the result
    /// is fully deterministic.
    pub fn detect(&self, nodes: &[EntityNode], edges: &[EdgeRef]) -> Vec<Vec<EntityNode>> {
        if nodes.is_empty() {
            return Vec::new();
        }

        let node_set: HashSet<&str> = nodes.iter().map(|n| n.uuid.as_str()).collect();

        // Undirected adjacency, weight = number of edges between the pair.
        let mut adjacency: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
        for node in nodes {
            adjacency.insert(node.uuid.as_str(), HashMap::new());
        }
        for edge in edges {
            let source = edge.source_node_uuid.as_str();
            let target = edge.target_node_uuid.as_str();
            if !node_set.contains(source) || !node_set.contains(target) {
                continue;
            }
            if let Some(neighbors) = adjacency.get_mut(source) {
                *neighbors.entry(target).or_insert(0) += 1;
            }
            if let Some(neighbors) = adjacency.get_mut(target) {
                *neighbors.entry(source).or_insert(0) += 1;
            }
        }

        // Every node starts in its own community.
        let mut labels: HashMap<&str, &str> = nodes
            .iter()
            .map(|n| (n.uuid.as_str(), n.uuid.as_str()))
            .collect();

        for _ in 0..self.max_iterations {
            let mut changed = false;

            for node in nodes {
                let uuid = node.uuid.as_str();
                let neighbors = &adjacency[uuid];
                if neighbors.is_empty() {
                    continue;
                }

                // Tally neighbor labels weighted by edge count.
                let mut label_weights: HashMap<&str, usize> = HashMap::new();
                let mut max_weight = 0;
                for (neighbor, weight) in neighbors {
                    let label = labels[neighbor];
                    let total = label_weights.entry(label).or_insert(0);
                    *total += weight;
                    if *total > max_weight {
                        max_weight = *total;
                    }
                }

                // Ties break to the lexicographically largest label, which
                // makes the pass deterministic for a fixed node order.
                let best_label = label_weights
                    .iter()
                    .filter(|(_, weight)| **weight == max_weight)
                    .map(|(label, _)| *label)
                    .max()
                    .unwrap_or(uuid);

                if labels[uuid] != best_label {
                    labels.insert(uuid, best_label);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        // Group by final label; the ordered map keeps output order stable.
        let mut clusters: BTreeMap<&str, Vec<EntityNode>> = BTreeMap::new();
        for node in nodes {
            clusters
                .entry(labels[node.uuid.as_str()])
                .or_default()
                .push(node.clone());
        }

        clusters
            .into_values()
            .filter(|cluster| cluster.len() >= 2)
            .collect()
    }
}
