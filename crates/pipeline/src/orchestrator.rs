//! Drives one extraction job through its phases.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use extract::{
    AggregatedKnowledge, ExtractionCapability, ExtractionMode, PartialKnowledge, Phase, aggregate_slots, escalate,
};
use index::{PageStore, PageUpsert, PersistMode, persist_page};
use ingest::{ExtractionInput, FragmentOptions, InputSource, build_inputs};
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::jobs::JobRegistry;
use crate::progress::{JobError, ProgressEvent};
use crate::request::ExtractionRequest;

pub const NO_CONTENT_MESSAGE: &str = "No usable content found in page fragments";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceStatus {
    #[serde(rename_all = "camelCase")]
    Saved { is_new: bool, mode: PersistMode },
    /// The caller opted out with `saveToIndex: false`.
    Skipped,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedExtraction {
    pub extraction_id: String,
    pub url: String,
    pub mode: ExtractionMode,
    pub knowledge: AggregatedKnowledge,
    pub persistence: PersistenceStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Completed(CompletedExtraction),
    /// Every fragment was filtered out; the job ended in `error` without
    /// calling the capability.
    NoContent,
}

impl ExtractionOutcome {
    pub fn knowledge(&self) -> Option<&AggregatedKnowledge> {
        match self {
            ExtractionOutcome::Completed(done) => Some(&done.knowledge),
            ExtractionOutcome::NoContent => None,
        }
    }
}

/// Builds and publishes progress events for one job.
struct ProgressEmitter {
    jobs: JobRegistry,
    extraction_id: String,
    url: String,
    source: InputSource,
    total_items: usize,
    processed_items: usize,
}

impl ProgressEmitter {
    fn emit(
        &self,
        phase: Phase,
        current_item: Option<String>,
        errors: Vec<JobError>,
        incremental_data: Option<AggregatedKnowledge>,
    ) {
        self.jobs.apply(ProgressEvent {
            extraction_id: self.extraction_id.clone(),
            phase,
            total_items: self.total_items,
            processed_items: self.processed_items,
            current_item,
            errors,
            incremental_data,
            timestamp: Utc::now(),
            url: self.url.clone(),
            source: self.source,
        });
    }

    fn fail(&self, message: &str) {
        self.emit(Phase::Error, None, vec![JobError::new(message)], None);
    }
}

pub struct ExtractionOrchestrator {
    capability: Arc<dyn ExtractionCapability>,
    store: Arc<dyn PageStore>,
    jobs: JobRegistry,
    config: PipelineConfig,
}

impl ExtractionOrchestrator {
    pub fn new(
        capability: Arc<dyn ExtractionCapability>,
        store: Arc<dyn PageStore>,
        jobs: JobRegistry,
        config: PipelineConfig,
    ) -> Self {
        Self {
            capability,
            store,
            jobs,
            config,
        }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Run the whole job: input preparation, every capability phase of the
    /// requested mode, persistence after the terminal phase.
    pub async fn run(&self, request: ExtractionRequest, extraction_id: String) -> PipelineResult<ExtractionOutcome> {
        let visited_at = Utc::now();
        self.jobs.register(&extraction_id, &request.url);

        let mut emitter = ProgressEmitter {
            jobs: self.jobs.clone(),
            extraction_id: extraction_id.clone(),
            url: request.url.clone(),
            source: request.source(),
            total_items: 0,
            processed_items: 0,
        };
        emitter.emit(Phase::Content, None, Vec::new(), None);

        let options = FragmentOptions {
            min_chars: request.min_fragment_chars(self.config.min_fragment_chars),
            source: request.source(),
            timestamp: Some(visited_at),
            ..FragmentOptions::default()
        };
        let inputs = build_inputs(&request.url, &request.title, &request.html_fragments, &options);

        if inputs.is_empty() {
            warn!(
                extraction_id = %extraction_id,
                url = %request.url,
                fragments = request.html_fragments.len(),
                "No usable fragments"
            );
            emitter.fail(NO_CONTENT_MESSAGE);
            return Ok(ExtractionOutcome::NoContent);
        }

        let phases = request.mode.phases();
        let terminal = request.mode.terminal_phase();
        emitter.total_items = inputs.len() * phases.len();

        info!(
            extraction_id = %extraction_id,
            url = %request.url,
            mode = ?request.mode,
            inputs = inputs.len(),
            phases = phases.len(),
            "Starting extraction"
        );

        let mut knowledge: Option<AggregatedKnowledge> = None;
        let mut persistence = PersistenceStatus::Skipped;

        for &phase in phases {
            let phase_knowledge = self.run_phase(phase, &inputs, knowledge.as_ref(), &mut emitter).await?;

            let merged = match knowledge.take() {
                Some(mut current) => {
                    escalate(&mut current, phase_knowledge);
                    current
                }
                None => phase_knowledge,
            };
            emitter.emit(phase, None, Vec::new(), Some(merged.clone()));

            if phase == terminal && request.should_persist() {
                persistence = self.persist(&request, &inputs, &merged, visited_at).await;
            }
            knowledge = Some(merged);
        }

        let knowledge = knowledge.unwrap_or_default();
        let errors = match &persistence {
            PersistenceStatus::Failed { message } => vec![JobError::new(message.clone())],
            _ => Vec::new(),
        };
        emitter.emit(Phase::Complete, None, errors, Some(knowledge.clone()));

        info!(
            extraction_id = %extraction_id,
            entities = knowledge.entities.len(),
            relationships = knowledge.relationships.len(),
            "Extraction complete"
        );

        Ok(ExtractionOutcome::Completed(CompletedExtraction {
            extraction_id,
            url: request.url,
            mode: request.mode,
            knowledge,
            persistence,
        }))
    }

    /// Run one capability phase over every input, at most `concurrency` at a
    /// time. Partials are aggregated in input order after each result.
    async fn run_phase(
        &self,
        phase: Phase,
        inputs: &[ExtractionInput],
        previous: Option<&AggregatedKnowledge>,
        emitter: &mut ProgressEmitter,
    ) -> PipelineResult<AggregatedKnowledge> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel(inputs.len().max(1));
        let mut tasks = JoinSet::new();

        for (idx, input) in inputs.iter().cloned().enumerate() {
            let capability = self.capability.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = capability.extract(&input, phase).await;
                let _ = tx.send((idx, input.url, result)).await;
            });
        }
        drop(tx);

        let mut partials: Vec<Option<PartialKnowledge>> = vec![None; inputs.len()];

        while let Some((idx, item, result)) = rx.recv().await {
            match result {
                Ok(partial) => {
                    partials[idx] = Some(partial);
                    emitter.processed_items += 1;

                    let snapshot = snapshot(previous, aggregate_slots(&partials));
                    emitter.emit(phase, Some(item), Vec::new(), Some(snapshot));
                }
                Err(e) => {
                    tasks.abort_all();
                    let message = format!("{:#}", e);
                    error!(
                        extraction_id = %emitter.extraction_id,
                        phase = %phase,
                        item = %item,
                        capability = self.capability.name(),
                        "Capability failed: {}",
                        message
                    );
                    emitter.fail(&message);
                    return Err(PipelineError::Capability { phase, message });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                let message = format!("Extraction task did not finish: {}", e);
                emitter.fail(&message);
                return Err(PipelineError::Task { phase, message });
            }
        }

        if partials.iter().any(Option::is_none) {
            let message = "Extraction task ended without a result".to_string();
            emitter.fail(&message);
            return Err(PipelineError::Task { phase, message });
        }

        Ok(aggregate_slots(&partials))
    }

    async fn persist(
        &self,
        request: &ExtractionRequest,
        inputs: &[ExtractionInput],
        knowledge: &AggregatedKnowledge,
        visited_at: DateTime<Utc>,
    ) -> PersistenceStatus {
        let upsert = PageUpsert {
            url: request.url.clone(),
            title: request.title.clone(),
            knowledge: knowledge.clone(),
            parts: inputs
                .iter()
                .flat_map(|i| i.document_parts.iter().flatten().cloned())
                .collect(),
            has_code: inputs.iter().any(|i| i.has_code),
            visited_at,
        };

        match persist_page(self.store.as_ref(), upsert).await {
            Ok(report) => PersistenceStatus::Saved {
                is_new: report.is_new,
                mode: report.mode,
            },
            Err(e) => {
                error!(url = %request.url, "Failed to persist extraction: {:#}", e);
                PersistenceStatus::Failed {
                    message: format!("{:#}", e),
                }
            }
        }
    }
}

/// The job's full view while a phase is still running.
fn snapshot(previous: Option<&AggregatedKnowledge>, in_progress: AggregatedKnowledge) -> AggregatedKnowledge {
    match previous {
        Some(previous) => {
            let mut view = previous.clone();
            escalate(&mut view, in_progress);
            view
        }
        None => in_progress,
    }
}
