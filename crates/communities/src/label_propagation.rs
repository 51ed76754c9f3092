use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::graph_export::{GraphData, renumber};

const MAX_ROUNDS: usize = 20;

/// Asynchronous label propagation with a seeded visit order, so the same
/// graph always yields the same partition.
pub struct LabelPropagation {
    seed: u64,
    max_rounds: usize,
}

impl Default for LabelPropagation {
    fn default() -> Self {
        Self {
            seed: 42,
            max_rounds: MAX_ROUNDS,
        }
    }
}

impl LabelPropagation {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn detect_communities(&self, graph: &GraphData) -> Vec<usize> {
        let n = graph.len();
        let mut labels: Vec<usize> = (0..n).collect();
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);

        for _ in 0..self.max_rounds {
            order.shuffle(&mut rng);
            let mut changed = false;

            for &node in &order {
                let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
                for (&neighbor, &w) in &graph.adjacency[node] {
                    if neighbor != node {
                        *weights.entry(labels[neighbor]).or_insert(0.0) += w;
                    }
                }

                let Some(best_weight) = weights.values().copied().reduce(f64::max) else {
                    continue;
                };
                // Keep the current label on ties, otherwise take the lowest.
                let current = labels[node];
                if weights.get(&current).is_some_and(|w| *w >= best_weight) {
                    continue;
                }
                if let Some((&label, _)) = weights.iter().find(|(_, w)| **w >= best_weight) {
                    labels[node] = label;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        renumber(&labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_export::two_triangles;

    #[test]
    fn test_triangles_get_own_labels() {
        let labels = LabelPropagation::default().detect_communities(&two_triangles());

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let graph = two_triangles();
        let first = LabelPropagation::new(7).detect_communities(&graph);
        let second = LabelPropagation::new(7).detect_communities(&graph);

        assert_eq!(first, second);
    }

    #[test]
    fn test_isolated_nodes_keep_own_label() {
        let labels = LabelPropagation::default().detect_communities(&GraphData::with_nodes(3));
        assert_eq!(labels, vec![0, 1, 2]);
    }
}
