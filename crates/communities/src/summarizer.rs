use std::collections::BTreeMap;

use index::{Community, GraphIndex};
use serde::{Deserialize, Serialize};

const KEY_ENTITY_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunitySummary {
    pub community_id: usize,
    pub level: usize,
    pub entity_count: usize,
    pub cohesion: f64,
    pub dominant_type: Option<String>,
    pub key_entities: Vec<String>,
    pub summary: String,
}

/// Describes communities from graph structure alone: the best-connected
/// members and the most common entity type.
#[derive(Clone)]
pub struct CommunitySummarizer {
    key_entity_count: usize,
}

impl Default for CommunitySummarizer {
    fn default() -> Self {
        Self {
            key_entity_count: KEY_ENTITY_COUNT,
        }
    }
}

impl CommunitySummarizer {
    pub fn new(key_entity_count: usize) -> Self {
        Self { key_entity_count }
    }

    pub fn summarize_community(&self, graph: &GraphIndex, community: &Community) -> CommunitySummary {
        let mut members: Vec<_> = community.members.iter().filter_map(|id| graph.node(*id)).collect();
        members.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.name.cmp(&b.name)));

        let key_entities: Vec<String> = members
            .iter()
            .take(self.key_entity_count)
            .map(|n| n.name.clone())
            .collect();

        let mut type_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for node in &members {
            *type_counts.entry(node.node_type.as_str()).or_insert(0) += 1;
        }
        // BTreeMap order makes ties resolve alphabetically
        let dominant_type = type_counts
            .iter()
            .fold(None::<(&str, usize)>, |best, (t, c)| match best {
                Some((_, best_count)) if best_count >= *c => best,
                _ => Some((*t, *c)),
            })
            .map(|(t, _)| t.to_string());

        let summary = build_summary(community.size, dominant_type.as_deref(), &key_entities);

        CommunitySummary {
            community_id: community.id,
            level: community.level,
            entity_count: community.size,
            cohesion: community.cohesion,
            dominant_type,
            key_entities,
            summary,
        }
    }

    pub fn summarize_all(&self, graph: &GraphIndex, level: usize) -> Vec<CommunitySummary> {
        let Some(detection) = graph.communities() else {
            return Vec::new();
        };

        let mut summaries: Vec<CommunitySummary> = detection
            .communities
            .iter()
            .filter(|c| c.level == level)
            .map(|c| self.summarize_community(graph, c))
            .collect();
        summaries.sort_by(|a, b| b.entity_count.cmp(&a.entity_count).then(a.community_id.cmp(&b.community_id)));
        summaries
    }
}

fn build_summary(size: usize, dominant_type: Option<&str>, key_entities: &[String]) -> String {
    let mut summary = format!("Community of {} entities", size);
    if let Some(t) = dominant_type {
        summary.push_str(&format!(", mostly {}", t));
    }
    if !key_entities.is_empty() {
        summary.push_str(&format!(", centered on {}", key_entities.join(", ")));
    }
    summary.push('.');
    summary
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use index::{CommunityDetection, EdgeKind};

    use super::*;

    #[test]
    fn test_summary_picks_hub_and_type() {
        let mut graph = GraphIndex::new();
        let now = Utc::now();
        let hub = graph.add_node("Rust", "LANGUAGE", None, now);
        let a = graph.add_node("Cargo", "TOOL", None, now);
        let b = graph.add_node("Clippy", "TOOL", None, now);
        graph.add_edge(hub, a, "ships", 1.0, 0.9, EdgeKind::Asserted);
        graph.add_edge(hub, b, "ships", 1.0, 0.9, EdgeKind::Asserted);
        graph.calculate_degree_metrics();

        let community = Community {
            id: 3,
            members: vec![hub, a, b],
            size: 3,
            cohesion: 1.0,
            level: 0,
        };
        graph.set_communities(CommunityDetection {
            algorithm: "test".into(),
            communities: vec![community.clone()],
            modularity: 0.0,
            levels: 1,
        });

        let summary = CommunitySummarizer::new(2).summarize_community(&graph, &community);
        assert_eq!(summary.key_entities, vec!["Rust", "Cargo"]);
        assert_eq!(summary.dominant_type.as_deref(), Some("TOOL"));
        assert_eq!(summary.summary, "Community of 3 entities, mostly TOOL, centered on Rust, Cargo.");

        assert_eq!(CommunitySummarizer::default().summarize_all(&graph, 0).len(), 1);
        assert!(CommunitySummarizer::default().summarize_all(&graph, 1).is_empty());
    }
}
