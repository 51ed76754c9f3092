use anyhow::Result;
use async_trait::async_trait;
use ingest::ExtractionInput;

use crate::mode::Phase;
use crate::schema::PartialKnowledge;

/// The black-box extraction capability: turns one input into partial
/// knowledge for the given phase. Implementations must be safe to call
/// concurrently; the orchestrator bounds how many calls are in flight.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    async fn extract(&self, input: &ExtractionInput, phase: Phase) -> Result<PartialKnowledge>;

    fn name(&self) -> &str {
        "extraction-capability"
    }
}
