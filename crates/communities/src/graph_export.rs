use std::collections::{BTreeMap, HashMap};

use index::{GraphIndex, NodeId};

/// Weighted undirected view of a graph, indexed densely from 0.
///
/// Parallel edges are merged by summing their weights. Self weight
/// (`adjacency[i][i]`) only appears after Louvain aggregation and holds the
/// weight internal to a collapsed community.
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    pub node_ids: Vec<NodeId>,
    pub adjacency: Vec<BTreeMap<usize, f64>>,
    pub total_weight: f64,
}

impl GraphData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(count: usize) -> Self {
        Self {
            node_ids: (0..count as NodeId).collect(),
            adjacency: vec![BTreeMap::new(); count],
            total_weight: 0.0,
        }
    }

    pub fn from_index(graph: &GraphIndex) -> Self {
        let mut data = GraphData::new();
        let mut idx_of: HashMap<NodeId, usize> = HashMap::new();

        for node in graph.nodes() {
            idx_of.insert(node.id, data.add_node(node.id));
        }
        for edge in graph.edges() {
            if let (Some(&a), Some(&b)) = (idx_of.get(&edge.from_id), idx_of.get(&edge.to_id)) {
                data.add_edge(a, b, edge.weight);
            }
        }

        data
    }

    pub fn add_node(&mut self, id: NodeId) -> usize {
        self.node_ids.push(id);
        self.adjacency.push(BTreeMap::new());
        self.node_ids.len() - 1
    }

    pub fn add_edge(&mut self, a: usize, b: usize, weight: f64) {
        if a == b {
            *self.adjacency[a].entry(a).or_insert(0.0) += weight;
        } else {
            *self.adjacency[a].entry(b).or_insert(0.0) += weight;
            *self.adjacency[b].entry(a).or_insert(0.0) += weight;
        }
        self.total_weight += weight;
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Weighted degree; self weight counts twice.
    pub fn strength(&self, node: usize) -> f64 {
        self.adjacency[node]
            .iter()
            .map(|(&other, &w)| if other == node { 2.0 * w } else { w })
            .sum()
    }

    /// Every undirected edge once, as `(a, b, weight)` with `a <= b`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(a, row)| {
            row.range(a..).map(move |(&b, &w)| (a, b, w))
        })
    }
}

/// Newman modularity of a node-to-community assignment.
pub fn modularity(graph: &GraphData, assignment: &[usize]) -> f64 {
    let m = graph.total_weight;
    if m <= 0.0 {
        return 0.0;
    }

    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut totals: HashMap<usize, f64> = HashMap::new();

    for (a, b, w) in graph.edges() {
        if assignment[a] == assignment[b] {
            *internal.entry(assignment[a]).or_insert(0.0) += w;
        }
    }
    for node in 0..graph.len() {
        *totals.entry(assignment[node]).or_insert(0.0) += graph.strength(node);
    }

    totals
        .iter()
        .map(|(c, tot)| internal.get(c).copied().unwrap_or(0.0) / m - (tot / (2.0 * m)).powi(2))
        .sum()
}

/// Share of a community's incident weight that stays inside it.
pub fn cohesion(graph: &GraphData, assignment: &[usize], community: usize) -> f64 {
    let mut internal = 0.0;
    let mut boundary = 0.0;

    for (a, b, w) in graph.edges() {
        match (assignment[a] == community, assignment[b] == community) {
            (true, true) => internal += w,
            (true, false) | (false, true) => boundary += w,
            _ => {}
        }
    }

    if internal + boundary > 0.0 {
        internal / (internal + boundary)
    } else {
        0.0
    }
}

/// Renumber community labels to 0..k in order of first appearance.
pub fn renumber(assignment: &[usize]) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    assignment
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect()
}

/// Two triangles joined by a weak bridge between nodes 2 and 3.
#[cfg(test)]
pub(crate) fn two_triangles() -> GraphData {
    let mut graph = GraphData::with_nodes(6);
    for (a, b) in [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)] {
        graph.add_edge(a, b, 1.0);
    }
    graph.add_edge(2, 3, 0.5);
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modularity_of_natural_split() {
        let graph = two_triangles();
        let split = modularity(&graph, &[0, 0, 0, 1, 1, 1]);
        let lumped = modularity(&graph, &[0; 6]);

        assert!(split > 0.3);
        assert!(lumped.abs() < 1e-9);
    }

    #[test]
    fn test_cohesion() {
        let graph = two_triangles();
        let assignment = [0, 0, 0, 1, 1, 1];
        assert!((cohesion(&graph, &assignment, 0) - 3.0 / 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_edges_listed_once() {
        let graph = two_triangles();
        assert_eq!(graph.edges().count(), 7);
        assert_eq!(graph.strength(2), 2.5);
    }

    #[test]
    fn test_renumber() {
        assert_eq!(renumber(&[7, 7, 3, 9, 3]), vec![0, 0, 1, 2, 1]);
    }
}
