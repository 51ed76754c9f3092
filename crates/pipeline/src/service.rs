use std::sync::Arc;

use extract::ExtractionCapability;
use index::PageStore;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::jobs::JobRegistry;
use crate::orchestrator::{ExtractionOrchestrator, ExtractionOutcome};
use crate::request::ExtractionRequest;
use crate::running::{RunningWorkRegistry, SharedResult};

pub type ExtractionResult = PipelineResult<ExtractionOutcome>;

/// Returned by [`ExtractionService::start_extraction`].
pub struct JobHandle {
    pub extraction_id: String,
    pub url: String,
    /// Another request for the same page was already running; this handle
    /// follows that job.
    pub joined: bool,
    result: SharedResult<ExtractionResult>,
}

impl JobHandle {
    pub async fn wait(self) -> ExtractionResult {
        self.result.await
    }

    pub fn summary(&self) -> JobStarted {
        JobStarted {
            extraction_id: self.extraction_id.clone(),
            url: self.url.clone(),
            joined: self.joined,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStarted {
    pub extraction_id: String,
    pub url: String,
    pub joined: bool,
}

/// Entry point for hosts: deduplicates concurrent requests per page and
/// runs each job on its own task.
pub struct ExtractionService {
    orchestrator: Arc<ExtractionOrchestrator>,
    running: RunningWorkRegistry<ExtractionResult>,
    jobs: JobRegistry,
    config: PipelineConfig,
}

impl ExtractionService {
    pub fn new(capability: Arc<dyn ExtractionCapability>, store: Arc<dyn PageStore>, config: PipelineConfig) -> Self {
        let jobs = JobRegistry::new(config.job_retention(), config.event_capacity);
        let orchestrator = ExtractionOrchestrator::new(capability, store, jobs.clone(), config.clone());
        Self {
            orchestrator: Arc::new(orchestrator),
            running: RunningWorkRegistry::new(),
            jobs,
            config,
        }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn running(&self) -> &RunningWorkRegistry<ExtractionResult> {
        &self.running
    }

    /// Start extracting a page, or join the extraction already running for
    /// the same normalized URL.
    pub fn start_extraction(&self, request: ExtractionRequest) -> PipelineResult<JobHandle> {
        if request.url.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("url is required".into()));
        }

        let extraction_id = request
            .extraction_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let url = request.url.clone();

        let orchestrator = self.orchestrator.clone();
        let job_id = extraction_id.clone();
        let work = async move { orchestrator.run(request, job_id).await };

        let running = self.running.start(&url, &extraction_id, work);
        if running.joined {
            info!(url = %url, extraction_id = %running.job_id, "Joined running extraction");
        } else {
            self.jobs.register(&running.job_id, &url);
        }

        Ok(JobHandle {
            extraction_id: running.job_id,
            url,
            joined: running.joined,
            result: running.result,
        })
    }

    /// Periodically drop running work that never settled.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.running
            .spawn_sweeper(self.config.sweep_interval(), self.config.running_work_max_age())
    }
}
