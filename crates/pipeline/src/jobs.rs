//! Live job state, keyed by extraction id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use extract::{AggregatedKnowledge, Phase};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::progress::{JobError, ProgressEvent};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionJob {
    pub extraction_id: String,
    pub url: String,
    pub phase: Phase,
    pub processed_items: usize,
    pub total_items: usize,
    pub errors: Vec<JobError>,
    /// `None` until the first aggregation.
    pub knowledge: Option<AggregatedKnowledge>,
    pub started_at: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    /// Distinguishes runs that reuse an extraction id.
    #[serde(skip)]
    generation: u64,
}

impl ExtractionJob {
    fn new(extraction_id: &str, url: &str, generation: u64) -> Self {
        let now = Utc::now();
        Self {
            extraction_id: extraction_id.to_string(),
            url: url.to_string(),
            phase: Phase::Initializing,
            processed_items: 0,
            total_items: 0,
            errors: Vec::new(),
            knowledge: None,
            started_at: now,
            last_update_time: now,
            generation,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Process-wide job table. Cloning shares the table.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, ExtractionJob>>,
    events: broadcast::Sender<ProgressEvent>,
    retention: Duration,
    generations: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new(retention: Duration, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            jobs: Arc::new(DashMap::new()),
            events,
            retention,
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    fn fresh_job(&self, extraction_id: &str, url: &str) -> ExtractionJob {
        ExtractionJob::new(extraction_id, url, self.generations.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a job in the `initializing` phase. Registering the id of a
    /// job still in progress leaves it untouched; a finished job waiting for
    /// expiry is replaced by the new run.
    pub fn register(&self, extraction_id: &str, url: &str) -> ExtractionJob {
        let mut job = self
            .jobs
            .entry(extraction_id.to_string())
            .or_insert_with(|| self.fresh_job(extraction_id, url));
        if job.is_finished() {
            debug!(extraction_id = %extraction_id, "Replacing finished job with a new run");
            *job = self.fresh_job(extraction_id, url);
        }
        job.clone()
    }

    /// Fold a progress event into the job and broadcast it.
    ///
    /// Events that would move a job backwards, or touch a finished job, are
    /// dropped. Returns whether the event was applied.
    pub fn apply(&self, event: ProgressEvent) -> bool {
        let finished = {
            let mut job = self
                .jobs
                .entry(event.extraction_id.clone())
                .or_insert_with(|| self.fresh_job(&event.extraction_id, &event.url));

            if !job.phase.can_advance_to(event.phase) {
                warn!(
                    extraction_id = %event.extraction_id,
                    from = %job.phase,
                    to = %event.phase,
                    "Ignoring out-of-order progress event"
                );
                return false;
            }

            job.phase = event.phase;
            job.total_items = event.total_items;
            job.processed_items = job.processed_items.max(event.processed_items);
            job.errors.extend(event.errors.iter().cloned());
            if let Some(knowledge) = &event.incremental_data {
                job.knowledge = Some(knowledge.clone());
            }
            job.last_update_time = event.timestamp;
            job.phase.is_terminal().then_some(job.generation)
        };

        debug!(
            extraction_id = %event.extraction_id,
            phase = %event.phase,
            processed = event.processed_items,
            total = event.total_items,
            "Job progress"
        );

        if let Some(generation) = finished {
            self.schedule_removal(event.extraction_id.clone(), generation);
        }
        // No subscribers is fine
        let _ = self.events.send(event);
        true
    }

    fn schedule_removal(&self, extraction_id: String, generation: u64) {
        let jobs = self.jobs.clone();
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let expired = jobs.remove_if(&extraction_id, |_, job| {
                job.generation == generation && job.is_finished()
            });
            if expired.is_some() {
                debug!(extraction_id = %extraction_id, "Expired finished job");
            }
        });
    }

    pub fn get(&self, extraction_id: &str) -> Option<ExtractionJob> {
        self.jobs.get(extraction_id).map(|job| job.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Wait until the job reaches a terminal phase or `timeout` elapses.
    /// Returns the last known state, or `None` if the job is unknown.
    pub async fn wait_for_terminal(&self, extraction_id: &str, timeout: Duration) -> Option<ExtractionJob> {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let current = self.get(extraction_id)?;
            if current.is_finished() {
                return Some(current);
            }

            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return self.get(extraction_id),
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) => return self.get(extraction_id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ingest::InputSource;

    use super::*;

    fn event(id: &str, phase: Phase, processed: usize) -> ProgressEvent {
        ProgressEvent {
            extraction_id: id.into(),
            phase,
            total_items: 2,
            processed_items: processed,
            current_item: None,
            errors: Vec::new(),
            incremental_data: None,
            timestamp: Utc::now(),
            url: "https://x.com".into(),
            source: InputSource::Direct,
        }
    }

    #[tokio::test]
    async fn test_phases_only_move_forward() {
        let registry = JobRegistry::new(Duration::from_secs(30), 16);
        registry.register("job", "https://x.com");

        assert!(registry.apply(event("job", Phase::Summary, 1)));
        assert!(!registry.apply(event("job", Phase::Basic, 2)));
        assert!(registry.apply(event("job", Phase::Complete, 2)));
        assert!(!registry.apply(event("job", Phase::Error, 2)));

        let job = registry.get("job").unwrap();
        assert_eq!(job.phase, Phase::Complete);
        assert_eq!(job.processed_items, 2);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = JobRegistry::new(Duration::from_secs(30), 16);
        registry.register("job", "https://x.com");
        registry.apply(event("job", Phase::Basic, 1));

        let again = registry.register("job", "https://x.com");
        assert_eq!(again.phase, Phase::Basic);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_id_after_finish_starts_fresh() {
        let registry = JobRegistry::new(Duration::from_secs(30), 16);
        registry.register("job", "https://x.com");
        assert!(registry.apply(event("job", Phase::Error, 0)));

        let rerun = registry.register("job", "https://x.com");
        assert_eq!(rerun.phase, Phase::Initializing);
        assert!(registry.apply(event("job", Phase::Basic, 1)));
        assert_eq!(registry.get("job").unwrap().phase, Phase::Basic);

        // The first run's expiry must not evict the rerun.
        tokio::time::sleep(Duration::from_secs(31)).await;
        let job = registry.get("job").unwrap();
        assert_eq!(job.phase, Phase::Basic);
        assert!(job.errors.is_empty());

        assert!(registry.apply(event("job", Phase::Complete, 2)));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(registry.get("job").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_jobs_expire() {
        let registry = JobRegistry::new(Duration::from_secs(30), 16);
        registry.register("job", "https://x.com");
        registry.apply(event("job", Phase::Error, 0));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(registry.get("job").is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(registry.get("job").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_terminal() {
        let registry = JobRegistry::new(Duration::from_secs(30), 16);
        registry.register("job", "https://x.com");

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.apply(event("job", Phase::Basic, 1));
            writer.apply(event("job", Phase::Complete, 2));
        });

        let job = registry.wait_for_terminal("job", Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.phase, Phase::Complete);

        registry.register("slow", "https://y.com");
        let pending = registry.wait_for_terminal("slow", Duration::from_secs(1)).await.unwrap();
        assert_eq!(pending.phase, Phase::Initializing);
        assert!(registry.wait_for_terminal("missing", Duration::from_secs(1)).await.is_none());
    }
}
