use std::collections::BTreeMap;

use tracing::debug;

use crate::graph_export::{GraphData, renumber};

const MAX_ITERATIONS: usize = 10;
const MAX_PASSES: usize = 8;
const MIN_GAIN: f64 = 1e-9;

pub struct LouvainDetector {
    max_iterations: usize,
    max_passes: usize,
}

impl Default for LouvainDetector {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            max_passes: MAX_PASSES,
        }
    }
}

impl LouvainDetector {
    pub fn new(max_iterations: usize, max_passes: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            max_passes: max_passes.max(1),
        }
    }

    /// Run Louvain community detection.
    ///
    /// Returns one assignment (original node index -> community) per level,
    /// finest first. Each level after the first is computed on the graph
    /// collapsed by the previous one.
    pub fn detect_communities(&self, graph: &GraphData) -> Vec<Vec<usize>> {
        if graph.is_empty() {
            return Vec::new();
        }

        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut current = graph.clone();
        // original node -> node of `current`
        let mut membership: Vec<usize> = (0..graph.len()).collect();

        for pass in 0..self.max_passes {
            let (local, moved) = self.one_level(&current);
            let local = renumber(&local);
            let community_count = local.iter().max().map_or(0, |c| c + 1);

            if !moved && !levels.is_empty() {
                break;
            }

            membership = membership.iter().map(|&node| local[node]).collect();
            levels.push(membership.clone());
            debug!(pass, communities = community_count, "Louvain pass complete");

            if !moved || community_count == current.len() || community_count <= 1 {
                break;
            }
            current = aggregate(&current, &local, community_count);
        }

        levels
    }

    /// Local moving phase: move each node to the neighboring community with
    /// the best modularity gain until nothing moves.
    fn one_level(&self, graph: &GraphData) -> (Vec<usize>, bool) {
        let n = graph.len();
        let mut communities: Vec<usize> = (0..n).collect();
        let degrees: Vec<f64> = (0..n).map(|i| graph.strength(i)).collect();
        let mut sigma_tot = degrees.clone();
        let m2 = 2.0 * graph.total_weight;

        if m2 <= 0.0 {
            return (communities, false);
        }

        let mut moved_any = false;
        let mut improved = true;
        let mut iteration = 0;

        while improved && iteration < self.max_iterations {
            improved = false;
            iteration += 1;

            for node in 0..n {
                let current_comm = communities[node];

                // Weight from node to each neighboring community
                let mut neighbor_comms: BTreeMap<usize, f64> = BTreeMap::new();
                for (&neighbor, &weight) in &graph.adjacency[node] {
                    if neighbor != node {
                        *neighbor_comms.entry(communities[neighbor]).or_insert(0.0) += weight;
                    }
                }

                sigma_tot[current_comm] -= degrees[node];

                let mut best_comm = current_comm;
                let mut best_gain = modularity_gain(
                    neighbor_comms.get(&current_comm).copied().unwrap_or(0.0),
                    sigma_tot[current_comm],
                    degrees[node],
                    m2,
                );

                for (&comm, &weight_to_comm) in &neighbor_comms {
                    if comm == current_comm {
                        continue;
                    }
                    let gain = modularity_gain(weight_to_comm, sigma_tot[comm], degrees[node], m2);
                    if gain > best_gain + MIN_GAIN {
                        best_gain = gain;
                        best_comm = comm;
                    }
                }

                sigma_tot[best_comm] += degrees[node];
                if best_comm != current_comm {
                    communities[node] = best_comm;
                    improved = true;
                    moved_any = true;
                }
            }
        }

        (communities, moved_any)
    }
}

/// Gain (up to a constant factor) of inserting a node with weighted degree
/// `k_i` into a community it shares `k_i_in` weight with.
fn modularity_gain(k_i_in: f64, sigma_tot: f64, k_i: f64, m2: f64) -> f64 {
    k_i_in - sigma_tot * k_i / m2
}

/// Collapse each community into a single node.
fn aggregate(graph: &GraphData, assignment: &[usize], community_count: usize) -> GraphData {
    let mut collapsed = GraphData::with_nodes(community_count);
    for (a, b, w) in graph.edges() {
        collapsed.add_edge(assignment[a], assignment[b], w);
    }
    collapsed
}
