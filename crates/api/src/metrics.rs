use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Metrics {
    // Extraction counters
    extractions_started: AtomicUsize,
    extractions_joined: AtomicUsize,
    extractions_completed: AtomicUsize,
    extractions_without_content: AtomicUsize,
    extractions_failed: AtomicUsize,
    persistence_failures: AtomicUsize,

    // Graph and discovery counters
    graph_builds: AtomicUsize,
    graph_builds_coalesced: AtomicUsize,
    discovery_queries: AtomicUsize,

    // Timing (in microseconds)
    total_extraction_time_us: AtomicU64,
    total_build_time_us: AtomicU64,
    total_discovery_time_us: AtomicU64,

    total_entities_extracted: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_extraction_started(&self, joined: bool) {
        if joined {
            self.extractions_joined.fetch_add(1, Ordering::Relaxed);
        } else {
            self.extractions_started.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_extraction_completed(&self, duration: Duration, entities: usize, persisted: bool) {
        self.extractions_completed.fetch_add(1, Ordering::Relaxed);
        self.total_extraction_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.total_entities_extracted.fetch_add(entities, Ordering::Relaxed);
        if !persisted {
            self.persistence_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_extraction_without_content(&self) {
        self.extractions_without_content.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extraction_failed(&self) {
        self.extractions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_graph_build(&self, duration: Duration, coalesced: bool) {
        if coalesced {
            self.graph_builds_coalesced.fetch_add(1, Ordering::Relaxed);
        } else {
            self.graph_builds.fetch_add(1, Ordering::Relaxed);
            self.total_build_time_us
                .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        }
    }

    pub fn record_discovery(&self, duration: Duration) {
        self.discovery_queries.fetch_add(1, Ordering::Relaxed);
        self.total_discovery_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            extractions_started: self.extractions_started.load(Ordering::Relaxed),
            extractions_joined: self.extractions_joined.load(Ordering::Relaxed),
            extractions_completed: self.extractions_completed.load(Ordering::Relaxed),
            extractions_without_content: self.extractions_without_content.load(Ordering::Relaxed),
            extractions_failed: self.extractions_failed.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            graph_builds: self.graph_builds.load(Ordering::Relaxed),
            graph_builds_coalesced: self.graph_builds_coalesced.load(Ordering::Relaxed),
            discovery_queries: self.discovery_queries.load(Ordering::Relaxed),
            avg_extraction_time_ms: self.avg_time_ms(&self.total_extraction_time_us, &self.extractions_completed),
            avg_build_time_ms: self.avg_time_ms(&self.total_build_time_us, &self.graph_builds),
            avg_discovery_time_ms: self.avg_time_ms(&self.total_discovery_time_us, &self.discovery_queries),
            total_entities_extracted: self.total_entities_extracted.load(Ordering::Relaxed),
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub extractions_started: usize,
    pub extractions_joined: usize,
    pub extractions_completed: usize,
    pub extractions_without_content: usize,
    pub extractions_failed: usize,
    pub persistence_failures: usize,
    pub graph_builds: usize,
    pub graph_builds_coalesced: usize,
    pub discovery_queries: usize,
    pub avg_extraction_time_ms: f64,
    pub avg_build_time_ms: f64,
    pub avg_discovery_time_ms: f64,
    pub total_entities_extracted: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
