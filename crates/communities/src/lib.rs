//! Community detection over the knowledge graph.

pub mod components;
pub mod graph_export;
pub mod label_propagation;
pub mod louvain;
pub mod summarizer;

pub use graph_export::{GraphData, cohesion, modularity};
pub use label_propagation::LabelPropagation;
pub use louvain::LouvainDetector;
pub use summarizer::{CommunitySummarizer, CommunitySummary};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use index::{Community, CommunityDetection, CommunityPartitioner, GraphIndex};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunityAlgorithm {
    /// Modularity optimization, hierarchical.
    #[default]
    Louvain,
    LabelPropagation,
    ConnectedComponents,
}

impl CommunityAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunityAlgorithm::Louvain => "louvain",
            CommunityAlgorithm::LabelPropagation => "label_propagation",
            CommunityAlgorithm::ConnectedComponents => "connected_components",
        }
    }
}

impl fmt::Display for CommunityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommunityAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "louvain" => Ok(CommunityAlgorithm::Louvain),
            "label_propagation" | "lpa" => Ok(CommunityAlgorithm::LabelPropagation),
            "connected_components" | "components" => Ok(CommunityAlgorithm::ConnectedComponents),
            other => bail!("Unknown community algorithm: {}", other),
        }
    }
}

pub struct CommunityDetector {
    algorithm: CommunityAlgorithm,
    louvain: LouvainDetector,
    label_propagation: LabelPropagation,
}

impl CommunityDetector {
    pub fn new(algorithm: CommunityAlgorithm) -> Self {
        Self {
            algorithm,
            louvain: LouvainDetector::default(),
            label_propagation: LabelPropagation::default(),
        }
    }

    pub fn algorithm(&self) -> CommunityAlgorithm {
        self.algorithm
    }

    /// Partition `graph`, returning every level's communities (level 0 is
    /// the finest) and the modularity of the finest level.
    pub fn detect_communities(&self, graph: &GraphIndex) -> Result<CommunityDetection> {
        let data = GraphData::from_index(graph);

        let levels = match self.algorithm {
            CommunityAlgorithm::Louvain => self.louvain.detect_communities(&data),
            CommunityAlgorithm::LabelPropagation => vec![self.label_propagation.detect_communities(&data)],
            CommunityAlgorithm::ConnectedComponents => vec![components::connected_components(&data)],
        };

        if levels.iter().any(|level| level.len() != data.len()) {
            bail!("{} produced an assignment of the wrong size", self.algorithm);
        }

        let modularity = levels.first().map_or(0.0, |finest| modularity(&data, finest));

        let mut communities = Vec::new();
        for (level, assignment) in levels.iter().enumerate() {
            let mut groups: BTreeMap<usize, Vec<index::NodeId>> = BTreeMap::new();
            for (idx, &label) in assignment.iter().enumerate() {
                groups.entry(label).or_default().push(data.node_ids[idx]);
            }

            for (label, mut members) in groups {
                members.sort_unstable();
                communities.push(Community {
                    id: communities.len(),
                    size: members.len(),
                    cohesion: cohesion(&data, assignment, label),
                    members,
                    level,
                });
            }
        }

        info!(
            algorithm = %self.algorithm,
            nodes = data.len(),
            levels = levels.len(),
            communities = communities.len(),
            modularity,
            "Detected communities"
        );

        Ok(CommunityDetection {
            algorithm: self.algorithm.to_string(),
            communities,
            modularity,
            levels: levels.len(),
        })
    }
}

impl Default for CommunityDetector {
    fn default() -> Self {
        Self::new(CommunityAlgorithm::default())
    }
}

impl CommunityPartitioner for CommunityDetector {
    fn name(&self) -> &str {
        self.algorithm.as_str()
    }

    fn detect(&self, graph: &GraphIndex) -> Result<CommunityDetection> {
        self.detect_communities(graph)
    }
}
