//! In-memory knowledge graph built from the page collection.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use extract::entity_key;
use serde::{Deserialize, Serialize};

pub type NodeId = u64;

pub const ASSERTED_EDGE_WEIGHT: f64 = 1.0;
pub const CO_OCCURRENCE_WEIGHT: f64 = 0.5;
pub const CO_OCCURRENCE_CONFIDENCE: f64 = 0.6;
pub const CO_OCCURRENCE_RELATIONSHIP: &str = "co_occurs_with";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub source_urls: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub metadata: NodeMetadata,
    pub degree: usize,
    pub centrality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Stated by the content (relationships and actions).
    Asserted,
    /// Inferred from two entities appearing on the same page.
    CoOccurrence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub relationship_type: String,
    pub weight: f64,
    pub confidence: f64,
    pub kind: EdgeKind,
}

impl GraphEdge {
    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.from_id == node { self.to_id } else { self.from_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: usize,
    pub members: Vec<NodeId>,
    pub size: usize,
    pub cohesion: f64,
    /// 0 is the finest partition.
    pub level: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityDetection {
    pub algorithm: String,
    pub communities: Vec<Community>,
    pub modularity: f64,
    pub levels: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighborhood {
    pub center: NodeId,
    /// Node ids with their BFS depth from the center, in visit order.
    pub nodes: Vec<(NodeId, usize)>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPath {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<GraphEdge>,
    pub distance: usize,
    /// Product of traversed edge confidences.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub asserted_edges: usize,
    pub co_occurrence_edges: usize,
    pub community_count: usize,
    pub modularity: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    nodes: BTreeMap<NodeId, GraphNode>,
    name_index: HashMap<String, NodeId>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<(NodeId, NodeId, String), usize>,
    adjacency: HashMap<NodeId, Vec<usize>>,
    communities: Option<CommunityDetection>,
    next_id: NodeId,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or fold the source into the existing node with the same
    /// (case-insensitive) name. Returns the node id either way.
    pub fn add_node(&mut self, name: &str, node_type: &str, source_url: Option<&str>, seen_at: DateTime<Utc>) -> NodeId {
        let key = entity_key(name);

        if let Some(&id) = self.name_index.get(&key) {
            if let Some(node) = self.nodes.get_mut(&id) {
                if let Some(url) = source_url {
                    node.metadata.source_urls.insert(url.to_string());
                }
                if seen_at < node.metadata.first_seen {
                    node.metadata.first_seen = seen_at;
                }
            }
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut source_urls = BTreeSet::new();
        if let Some(url) = source_url {
            source_urls.insert(url.to_string());
        }

        self.nodes.insert(
            id,
            GraphNode {
                id,
                name: name.to_string(),
                node_type: node_type.to_string(),
                metadata: NodeMetadata {
                    source_urls,
                    first_seen: seen_at,
                },
                degree: 0,
                centrality: 0.0,
            },
        );
        self.name_index.insert(key, id);
        id
    }

    /// Add an edge. Self-loops and edges to unknown nodes are rejected.
    /// Co-occurrence edges are undirected, so their endpoints are stored in
    /// id order. A duplicate (from, to, type) returns the existing edge.
    pub fn add_edge(
        &mut self,
        from_id: NodeId,
        to_id: NodeId,
        relationship_type: &str,
        weight: f64,
        confidence: f64,
        kind: EdgeKind,
    ) -> Option<usize> {
        if from_id == to_id || !self.nodes.contains_key(&from_id) || !self.nodes.contains_key(&to_id) {
            return None;
        }

        let (from_id, to_id) = match kind {
            EdgeKind::CoOccurrence => (from_id.min(to_id), from_id.max(to_id)),
            EdgeKind::Asserted => (from_id, to_id),
        };

        let key = (from_id, to_id, relationship_type.to_string());
        if let Some(&existing) = self.edge_index.get(&key) {
            return Some(existing);
        }

        let idx = self.edges.len();
        self.edges.push(GraphEdge {
            from_id,
            to_id,
            relationship_type: relationship_type.to_string(),
            weight,
            confidence,
            kind,
        });
        self.edge_index.insert(key, idx);
        self.adjacency.entry(from_id).or_default().push(idx);
        self.adjacency.entry(to_id).or_default().push(idx);
        Some(idx)
    }

    /// Degree is the number of distinct incident edges; centrality is degree
    /// relative to the mean degree.
    pub fn calculate_degree_metrics(&mut self) {
        for node in self.nodes.values_mut() {
            node.degree = self.adjacency.get(&node.id).map_or(0, Vec::len);
        }

        let total: usize = self.nodes.values().map(|n| n.degree).sum();
        let mean = if self.nodes.is_empty() {
            0.0
        } else {
            total as f64 / self.nodes.len() as f64
        };

        for node in self.nodes.values_mut() {
            node.centrality = if mean > 0.0 { node.degree as f64 / mean } else { 0.0 };
        }
    }

    /// Breadth-first neighborhood of `node_id`, at most `max_depth` hops and
    /// `max_nodes` nodes (center included). Expansion stops as soon as the cap
    /// is reached, even part-way through a depth level.
    pub fn get_neighborhood(&self, node_id: NodeId, max_depth: usize, max_nodes: usize) -> Option<Neighborhood> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }

        let mut visited: HashSet<NodeId> = HashSet::from([node_id]);
        let mut order = vec![(node_id, 0)];
        let mut queue = VecDeque::from([(node_id, 0usize)]);

        'bfs: while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.neighbor_ids(current) {
                if order.len() >= max_nodes {
                    break 'bfs;
                }
                if visited.insert(neighbor) {
                    order.push((neighbor, depth + 1));
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }
        order.truncate(max_nodes.max(1));

        let included: HashSet<NodeId> = order.iter().map(|(id, _)| *id).collect();
        let edges = self
            .edges
            .iter()
            .filter(|e| included.contains(&e.from_id) && included.contains(&e.to_id))
            .cloned()
            .collect();

        Some(Neighborhood {
            center: node_id,
            nodes: order,
            edges,
        })
    }

    /// Shortest path by hop count over undirected adjacency. Between two
    /// nodes the most confident edge is traversed. `None` if no path exists
    /// within `max_depth` hops.
    pub fn find_shortest_path(&self, from_id: NodeId, to_id: NodeId, max_depth: usize) -> Option<GraphPath> {
        if !self.nodes.contains_key(&from_id) || !self.nodes.contains_key(&to_id) {
            return None;
        }
        if from_id == to_id {
            return Some(GraphPath {
                nodes: vec![from_id],
                edges: Vec::new(),
                distance: 0,
                confidence: 1.0,
            });
        }

        let mut predecessors: HashMap<NodeId, (NodeId, usize)> = HashMap::new();
        let mut visited: HashSet<NodeId> = HashSet::from([from_id]);
        let mut frontier = vec![from_id];
        let mut depth = 0;

        while !frontier.is_empty() && depth < max_depth {
            depth += 1;
            let mut next = Vec::new();

            for current in frontier {
                for (neighbor, edge_idx) in self.best_edges_from(current) {
                    if !visited.insert(neighbor) {
                        continue;
                    }
                    predecessors.insert(neighbor, (current, edge_idx));
                    if neighbor == to_id {
                        return Some(self.reconstruct_path(from_id, to_id, &predecessors));
                    }
                    next.push(neighbor);
                }
            }

            frontier = next;
        }

        None
    }

    fn reconstruct_path(&self, from_id: NodeId, to_id: NodeId, predecessors: &HashMap<NodeId, (NodeId, usize)>) -> GraphPath {
        let mut nodes = vec![to_id];
        let mut edges = Vec::new();
        let mut current = to_id;

        while current != from_id {
            let Some(&(prev, edge_idx)) = predecessors.get(&current) else {
                break;
            };
            edges.push(self.edges[edge_idx].clone());
            nodes.push(prev);
            current = prev;
        }

        nodes.reverse();
        edges.reverse();
        let confidence = edges.iter().map(|e| e.confidence).product();

        GraphPath {
            distance: edges.len(),
            nodes,
            edges,
            confidence,
        }
    }

    /// For each neighbor of `node`, the index of the most confident edge to it.
    fn best_edges_from(&self, node: NodeId) -> Vec<(NodeId, usize)> {
        let mut best: BTreeMap<NodeId, usize> = BTreeMap::new();
        for &idx in self.adjacency.get(&node).into_iter().flatten() {
            let neighbor = self.edges[idx].other_end(node);
            best.entry(neighbor)
                .and_modify(|current| {
                    if self.edges[idx].confidence > self.edges[*current].confidence {
                        *current = idx;
                    }
                })
                .or_insert(idx);
        }
        best.into_iter().collect()
    }

    fn neighbor_ids(&self, node: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .map(|&idx| self.edges[idx].other_end(node))
            .filter(|n| seen.insert(*n))
            .collect()
    }

    /// Top `n` nodes by degree (ties broken by id).
    pub fn get_hub_nodes(&self, n: usize) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| b.degree.cmp(&a.degree).then(a.id.cmp(&b.id)));
        nodes.truncate(n);
        nodes
    }

    pub fn get_top_nodes_by_centrality(&self, n: usize) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| b.centrality.total_cmp(&a.centrality).then(a.id.cmp(&b.id)));
        nodes.truncate(n);
        nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&GraphNode> {
        self.name_index.get(&entity_key(name)).and_then(|id| self.nodes.get(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn communities(&self) -> Option<&CommunityDetection> {
        self.communities.as_ref()
    }

    pub fn set_communities(&mut self, detection: CommunityDetection) {
        self.communities = Some(detection);
    }

    /// Finest-level community containing `node`.
    pub fn community_of(&self, node: NodeId) -> Option<&Community> {
        self.communities
            .as_ref()?
            .communities
            .iter()
            .find(|c| c.level == 0 && c.members.contains(&node))
    }

    pub fn stats(&self) -> GraphStats {
        let co_occurrence_edges = self.edges.iter().filter(|e| e.kind == EdgeKind::CoOccurrence).count();
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            asserted_edges: self.edges.len() - co_occurrence_edges,
            co_occurrence_edges,
            community_count: self.communities.as_ref().map_or(0, |c| c.communities.len()),
            modularity: self.communities.as_ref().map(|c| c.modularity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str]) -> (GraphIndex, Vec<NodeId>) {
        let mut graph = GraphIndex::new();
        let now = Utc::now();
        let ids: Vec<NodeId> = names.iter().map(|n| graph.add_node(n, "CONCEPT", None, now)).collect();
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1], "related_to", 1.0, 0.9, EdgeKind::Asserted);
        }
        (graph, ids)
    }

    #[test]
    fn test_add_node_is_unique_by_name() {
        let mut graph = GraphIndex::new();
        let earlier = Utc::now() - chrono::Duration::days(1);
        let a = graph.add_node("OpenAI", "ORGANIZATION", Some("https://a.com"), Utc::now());
        let b = graph.add_node("openai", "CONCEPT", Some("https://b.com"), earlier);

        assert_eq!(a, b);
        let node = graph.node(a).unwrap();
        assert_eq!(node.name, "OpenAI");
        assert_eq!(node.node_type, "ORGANIZATION");
        assert_eq!(node.metadata.source_urls.len(), 2);
        assert_eq!(node.metadata.first_seen, earlier);
    }

    #[test]
    fn test_self_loops_and_duplicates_rejected() {
        let (mut graph, ids) = chain(&["A", "B"]);

        assert_eq!(graph.add_edge(ids[0], ids[0], "is", 1.0, 1.0, EdgeKind::Asserted), None);
        assert_eq!(graph.add_edge(ids[0], ids[1], "related_to", 1.0, 0.9, EdgeKind::Asserted), Some(0));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_degree_and_centrality() {
        let (mut graph, ids) = chain(&["A", "B", "C"]);
        graph.calculate_degree_metrics();

        let b = graph.node(ids[1]).unwrap();
        assert_eq!(b.degree, 2);
        // mean degree is 4/3
        assert!((b.centrality - 1.5).abs() < 1e-9);
        assert_eq!(graph.get_hub_nodes(1)[0].id, ids[1]);
        assert_eq!(graph.get_top_nodes_by_centrality(1)[0].id, ids[1]);
    }

    #[test]
    fn test_shortest_path() {
        let (mut graph, ids) = chain(&["A", "B", "C"]);
        let d = graph.add_node("D", "CONCEPT", None, Utc::now());

        let path = graph.find_shortest_path(ids[0], ids[2], 5).unwrap();
        assert_eq!(path.nodes, vec![ids[0], ids[1], ids[2]]);
        assert_eq!(path.distance, 2);
        assert!((path.confidence - 0.81).abs() < 1e-9);

        assert!(graph.find_shortest_path(ids[0], ids[2], 1).is_none());
        for depth in [1, 2, 10, 100] {
            assert!(graph.find_shortest_path(ids[0], d, depth).is_none());
        }
    }

    #[test]
    fn test_path_prefers_confident_edge() {
        let (mut graph, ids) = chain(&["A", "B"]);
        graph.add_edge(ids[1], ids[0], "mentions", 1.0, 0.99, EdgeKind::Asserted);

        let path = graph.find_shortest_path(ids[0], ids[1], 3).unwrap();
        assert_eq!(path.edges[0].relationship_type, "mentions");
    }

    #[test]
    fn test_neighborhood_respects_caps() {
        let mut graph = GraphIndex::new();
        let now = Utc::now();
        let hub = graph.add_node("hub", "CONCEPT", None, now);
        for i in 0..10 {
            let leaf = graph.add_node(&format!("leaf{}", i), "CONCEPT", None, now);
            graph.add_edge(hub, leaf, "has", 1.0, 1.0, EdgeKind::Asserted);
        }

        let capped = graph.get_neighborhood(hub, 2, 4).unwrap();
        assert_eq!(capped.nodes.len(), 4);
        assert_eq!(capped.nodes[0], (hub, 0));
        assert_eq!(capped.edges.len(), 3);

        let shallow = graph.get_neighborhood(hub, 0, 100).unwrap();
        assert_eq!(shallow.nodes.len(), 1);
        assert!(graph.get_neighborhood(999, 1, 10).is_none());
    }
}
