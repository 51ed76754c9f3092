//! Whole-graph rebuilds with single-flight coordination.
//!
//! A build replaces the published graph wholesale. Readers holding a
//! snapshot keep seeing the old graph until the new one is swapped in.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::graph::{CommunityDetection, GraphIndex, GraphStats};
use crate::store::PageStore;

/// Partitions a graph into communities.
pub trait CommunityPartitioner: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, graph: &GraphIndex) -> Result<CommunityDetection>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphBuildConfig {
    pub detect_communities: bool,
}

impl Default for GraphBuildConfig {
    fn default() -> Self {
        Self {
            detect_communities: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Building { started_at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    Built {
        finished_at: DateTime<Utc>,
        node_count: usize,
        edge_count: usize,
    },
}

impl BuildState {
    pub fn is_building(&self) -> bool {
        matches!(self, BuildState::Building { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "stats", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// This call ran the build.
    Built(GraphStats),
    /// Another build was in flight; this call did nothing.
    Coalesced,
    /// Another build was in flight; this call waited for it to finish.
    Joined(GraphStats),
}

/// Restores the pre-build state if a build exits early.
struct BuildClaim<'a> {
    state: &'a watch::Sender<BuildState>,
    previous: Option<BuildState>,
}

impl BuildClaim<'_> {
    fn complete(mut self, finished: BuildState) {
        self.previous = None;
        self.state.send_replace(finished);
    }
}

impl Drop for BuildClaim<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.state.send_replace(previous);
        }
    }
}

pub struct GraphBuilder {
    current: RwLock<Arc<GraphIndex>>,
    state: watch::Sender<BuildState>,
    detector: Option<Arc<dyn CommunityPartitioner>>,
    config: GraphBuildConfig,
}

impl GraphBuilder {
    pub fn new(detector: Option<Arc<dyn CommunityPartitioner>>, config: GraphBuildConfig) -> Self {
        let (state, _) = watch::channel(BuildState::Idle);
        Self {
            current: RwLock::new(Arc::new(GraphIndex::new())),
            state,
            detector,
            config,
        }
    }

    /// The currently published graph.
    pub fn snapshot(&self) -> Arc<GraphIndex> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn state(&self) -> BuildState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BuildState> {
        self.state.subscribe()
    }

    /// Rebuild the graph from every stored page. If a build is already
    /// running this returns [`BuildOutcome::Coalesced`] immediately.
    pub async fn build(&self, store: &dyn PageStore) -> Result<BuildOutcome> {
        let Some(claim) = self.try_claim() else {
            info!("Graph build already in progress, coalescing request");
            return Ok(BuildOutcome::Coalesced);
        };

        let pages = store.list_pages().await.context("Failed to load page collection")?;
        let mut graph = GraphIndex::from_pages(&pages);

        if self.config.detect_communities {
            if let Some(detector) = &self.detector {
                match detector.detect(&graph) {
                    Ok(detection) => {
                        info!(
                            algorithm = detector.name(),
                            communities = detection.communities.len(),
                            modularity = detection.modularity,
                            "Community detection complete"
                        );
                        graph.set_communities(detection);
                    }
                    Err(e) => warn!("Community detection failed, continuing without communities: {:#}", e),
                }
            }
        }

        let stats = graph.stats();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(graph);

        claim.complete(BuildState::Built {
            finished_at: Utc::now(),
            node_count: stats.node_count,
            edge_count: stats.edge_count,
        });

        info!(
            pages = pages.len(),
            nodes = stats.node_count,
            edges = stats.edge_count,
            "Graph build complete"
        );
        Ok(BuildOutcome::Built(stats))
    }

    /// Like [`build`](Self::build), but a caller that finds a build in flight
    /// waits for it and reports the resulting graph.
    pub async fn build_or_wait(&self, store: &dyn PageStore) -> Result<BuildOutcome> {
        match self.build(store).await? {
            BuildOutcome::Coalesced => {
                self.wait_until_idle().await?;
                Ok(BuildOutcome::Joined(self.snapshot().stats()))
            }
            outcome => Ok(outcome),
        }
    }

    pub async fn wait_until_idle(&self) -> Result<BuildState> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| !s.is_building())
            .await
            .map_err(|_| anyhow!("Graph build state channel closed"))?;
        Ok(state.clone())
    }

    fn try_claim(&self) -> Option<BuildClaim<'_>> {
        let mut previous = None;
        let claimed = self.state.send_if_modified(|state| {
            if state.is_building() {
                return false;
            }
            previous = Some(std::mem::replace(
                state,
                BuildState::Building {
                    started_at: Utc::now(),
                },
            ));
            true
        });

        claimed.then(|| BuildClaim {
            state: &self.state,
            previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use extract::{AggregatedKnowledge, Entity};

    use super::*;
    use crate::graph::{Community, CommunityDetection};
    use crate::store::{IndexUpdateReport, PageRecord};

    struct SlowStore {
        pages: Vec<PageRecord>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl PageStore for SlowStore {
        async fn get_page(&self, _url: &str) -> Result<Option<PageRecord>> {
            Ok(None)
        }

        async fn list_pages(&self) -> Result<Vec<PageRecord>> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("store offline");
            }
            Ok(self.pages.clone())
        }

        async fn update_incremental(&self, _page: &PageRecord, _is_new: bool) -> Result<IndexUpdateReport> {
            Ok(IndexUpdateReport::default())
        }

        async fn rebuild_collection(&self, _page: &PageRecord) -> Result<()> {
            Ok(())
        }
    }

    struct OneCommunity;

    impl CommunityPartitioner for OneCommunity {
        fn name(&self) -> &str {
            "one"
        }

        fn detect(&self, graph: &GraphIndex) -> Result<CommunityDetection> {
            let members: Vec<_> = graph.nodes().map(|n| n.id).collect();
            Ok(CommunityDetection {
                algorithm: "one".into(),
                communities: vec![Community {
                    id: 0,
                    size: members.len(),
                    members,
                    cohesion: 1.0,
                    level: 0,
                }],
                modularity: 0.0,
                levels: 1,
            })
        }
    }

    struct Broken;

    impl CommunityPartitioner for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn detect(&self, _graph: &GraphIndex) -> Result<CommunityDetection> {
            anyhow::bail!("partition diverged")
        }
    }

    fn store(delay_ms: u64, fail: bool) -> SlowStore {
        let knowledge = AggregatedKnowledge {
            entities: vec![Entity::new("A", "CONCEPT", 0.9), Entity::new("B", "CONCEPT", 0.9)],
            ..Default::default()
        };
        SlowStore {
            pages: vec![PageRecord {
                url: "https://a.com".into(),
                title: "A".into(),
                domain: None,
                knowledge,
                chunks: Vec::new(),
                has_code: false,
                visited_at: Utc::now(),
                indexed_at: Utc::now(),
            }],
            delay: Duration::from_millis(delay_ms),
            fail,
        }
    }

    #[tokio::test]
    async fn test_build_publishes_graph_with_communities() {
        let builder = GraphBuilder::new(Some(Arc::new(OneCommunity)), GraphBuildConfig::default());
        let outcome = builder.build(&store(0, false)).await.unwrap();

        assert!(matches!(outcome, BuildOutcome::Built(ref s) if s.node_count == 2 && s.edge_count == 1));
        assert_eq!(builder.snapshot().stats().community_count, 1);
        assert!(matches!(builder.state(), BuildState::Built { node_count: 2, .. }));
    }

    #[tokio::test]
    async fn test_detection_failure_is_not_fatal() {
        let builder = GraphBuilder::new(Some(Arc::new(Broken)), GraphBuildConfig::default());
        builder.build(&store(0, false)).await.unwrap();

        let graph = builder.snapshot();
        assert_eq!(graph.node_count(), 2);
        assert!(graph.communities().is_none());
    }

    #[tokio::test]
    async fn test_detection_can_be_disabled() {
        let config = GraphBuildConfig {
            detect_communities: false,
        };
        let builder = GraphBuilder::new(Some(Arc::new(OneCommunity)), config);
        builder.build(&store(0, false)).await.unwrap();

        assert!(builder.snapshot().communities().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_builds_coalesce() {
        let builder = GraphBuilder::new(None, GraphBuildConfig::default());
        let store = store(100, false);

        let (first, second) = tokio::join!(builder.build(&store), builder.build(&store));

        assert!(matches!(first.unwrap(), BuildOutcome::Built(_)));
        assert!(matches!(second.unwrap(), BuildOutcome::Coalesced));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_caller_sees_finished_graph() {
        let builder = GraphBuilder::new(None, GraphBuildConfig::default());
        let store = store(100, false);

        let (first, second) = tokio::join!(builder.build(&store), builder.build_or_wait(&store));

        assert!(matches!(first.unwrap(), BuildOutcome::Built(_)));
        match second.unwrap() {
            BuildOutcome::Joined(stats) => assert_eq!(stats.node_count, 2),
            other => panic!("expected joined outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_build_restores_previous_state() {
        let builder = GraphBuilder::new(None, GraphBuildConfig::default());
        builder.build(&store(0, false)).await.unwrap();

        assert!(builder.build(&store(0, true)).await.is_err());
        assert!(matches!(builder.state(), BuildState::Built { .. }));
        assert_eq!(builder.snapshot().node_count(), 2);
    }
}
