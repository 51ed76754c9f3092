//! Projecting stored pages into a [`GraphIndex`].

use std::collections::BTreeSet;

use extract::DEFAULT_ACTION_CONFIDENCE;
use tracing::debug;

use crate::graph::{
    ASSERTED_EDGE_WEIGHT, CO_OCCURRENCE_CONFIDENCE, CO_OCCURRENCE_RELATIONSHIP, CO_OCCURRENCE_WEIGHT, EdgeKind,
    GraphIndex, NodeId,
};
use crate::store::PageRecord;

const ENDPOINT_TYPE: &str = "entity";

impl GraphIndex {
    /// Build a fresh graph from the whole collection.
    ///
    /// Nodes are created in one pass over every page (first occurrence of a
    /// name assigns the id). Edges follow in a second pass: asserted edges
    /// from actions and relationships, then one co-occurrence edge for every
    /// unordered pair of distinct entities listed on the same page. Degree
    /// metrics are computed last.
    pub fn from_pages(pages: &[PageRecord]) -> Self {
        let mut graph = GraphIndex::new();

        for page in pages {
            let url = Some(page.url.as_str());
            let seen = page.visited_at;

            for entity in &page.knowledge.entities {
                graph.add_node(&entity.name, entity.primary_type(), url, seen);
            }
            for rel in &page.knowledge.relationships {
                graph.add_node(&rel.from, ENDPOINT_TYPE, url, seen);
                graph.add_node(&rel.to, ENDPOINT_TYPE, url, seen);
            }
            for action in page.knowledge.content_actions.iter().flatten() {
                graph.add_node(&action.subject, ENDPOINT_TYPE, url, seen);
                graph.add_node(&action.object, ENDPOINT_TYPE, url, seen);
            }
        }

        for page in pages {
            graph.add_asserted_edges(page);
        }
        for page in pages {
            graph.add_co_occurrence_edges(page);
        }

        graph.calculate_degree_metrics();
        debug!(
            pages = pages.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Projected page collection into graph"
        );
        graph
    }

    fn add_asserted_edges(&mut self, page: &PageRecord) {
        for action in page.knowledge.content_actions.iter().flatten() {
            if let (Some(from), Some(to)) = (self.id_of(&action.subject), self.id_of(&action.object)) {
                self.add_edge(
                    from,
                    to,
                    &action.verb,
                    ASSERTED_EDGE_WEIGHT,
                    action.confidence.unwrap_or(DEFAULT_ACTION_CONFIDENCE),
                    EdgeKind::Asserted,
                );
            }
        }
        for rel in &page.knowledge.relationships {
            if let (Some(from), Some(to)) = (self.id_of(&rel.from), self.id_of(&rel.to)) {
                self.add_edge(from, to, &rel.relationship, ASSERTED_EDGE_WEIGHT, rel.confidence, EdgeKind::Asserted);
            }
        }
    }

    fn add_co_occurrence_edges(&mut self, page: &PageRecord) {
        let ids: BTreeSet<NodeId> = page
            .knowledge
            .entities
            .iter()
            .filter_map(|e| self.id_of(&e.name))
            .collect();
        let ids: Vec<NodeId> = ids.into_iter().collect();

        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                self.add_edge(
                    a,
                    b,
                    CO_OCCURRENCE_RELATIONSHIP,
                    CO_OCCURRENCE_WEIGHT,
                    CO_OCCURRENCE_CONFIDENCE,
                    EdgeKind::CoOccurrence,
                );
            }
        }
    }

    fn id_of(&self, name: &str) -> Option<NodeId> {
        self.node_by_name(name).map(|n| n.id)
    }
}
