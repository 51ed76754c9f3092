//! Cross-page relationship discovery over the stored collection.

pub mod discovery;
pub mod keywords;
pub mod strategies;

pub use discovery::{DiscoveryConfig, DiscoveryRequest, RelationshipDiscovery, RelationshipResult};
pub use strategies::{AnalysisType, DiscoveryStrategy, RelatedPage, temporal_score};
