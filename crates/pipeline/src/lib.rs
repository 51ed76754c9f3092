//! Extraction pipeline: orchestration, job tracking, single-flight per page.

pub mod config;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod progress;
pub mod request;
pub mod running;
pub mod service;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use jobs::{ExtractionJob, JobRegistry};
pub use orchestrator::{
    CompletedExtraction, ExtractionOrchestrator, ExtractionOutcome, NO_CONTENT_MESSAGE, PersistenceStatus,
};
pub use progress::{JobError, ProgressEvent, ProgressWatermark};
pub use request::{ExtractionRequest, ExtractionSettings};
pub use running::{RunningWork, RunningWorkRegistry};
pub use service::{ExtractionResult, ExtractionService, JobHandle, JobStarted};
