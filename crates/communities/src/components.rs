use petgraph::unionfind::UnionFind;

use crate::graph_export::{GraphData, renumber};

/// Each connected component becomes one community.
pub fn connected_components(graph: &GraphData) -> Vec<usize> {
    let mut sets = UnionFind::<usize>::new(graph.len());
    for (a, b, _) in graph.edges() {
        sets.union(a, b);
    }
    renumber(&sets.into_labeling())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components() {
        let mut graph = GraphData::with_nodes(5);
        graph.add_edge(0, 1, 1.0);
        graph.add_edge(1, 2, 0.5);
        graph.add_edge(3, 4, 1.0);

        assert_eq!(connected_components(&graph), vec![0, 0, 0, 1, 1]);
    }
}
