//! Page persistence and the knowledge graph projected from it.

pub mod builder;
pub mod graph;
pub mod projection;
pub mod store;

pub use builder::{BuildOutcome, BuildState, CommunityPartitioner, GraphBuildConfig, GraphBuilder};
pub use graph::{
    Community, CommunityDetection, EdgeKind, GraphEdge, GraphIndex, GraphNode, GraphPath, GraphStats, Neighborhood,
    NodeId, NodeMetadata,
};
pub use store::{
    InMemoryPageStore, IndexUpdateReport, PageRecord, PageStore, PageUpsert, PersistMode, PersistReport, persist_page,
};
