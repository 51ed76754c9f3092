use extract::Phase;
use thiserror::Error;

/// Failures an extraction caller can observe.
///
/// `Clone` because one result is shared between every caller joined to the
/// same in-flight extraction.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Extraction failed during {phase} phase: {message}")]
    Capability { phase: Phase, message: String },

    #[error("Extraction task failed during {phase} phase: {message}")]
    Task { phase: Phase, message: String },

    #[error("Invalid extraction request: {0}")]
    InvalidRequest(String),
}

impl PipelineError {
    /// Phase the failure happened in, if it happened inside a phase.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            PipelineError::Capability { phase, .. } | PipelineError::Task { phase, .. } => Some(*phase),
            PipelineError::InvalidRequest(_) => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
