pub mod aggregate;
pub mod capability;
pub mod llm;
pub mod mode;
pub mod normalizer;
pub mod prompt;
pub mod retry;
pub mod schema;

pub use aggregate::{NO_SUMMARY, aggregate, aggregate_slots, escalate};
pub use capability::ExtractionCapability;
pub use llm::{OllamaClient, OllamaExtractor};
pub use mode::{ExtractionMode, Phase};
pub use normalizer::{entity_key, hostname, normalize_url};
pub use retry::{RetryConfig, RetryPolicy};
pub use schema::{
    AggregatedKnowledge, ContentAction, ContentMetrics, DEFAULT_ACTION_CONFIDENCE, Entity, KNOWLEDGE_SCHEMA_VERSION, PartialKnowledge,
    Relationship,
};
