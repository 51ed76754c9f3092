use std::time::Duration;

use ingest::DEFAULT_MIN_FRAGMENT_CHARS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Capability calls in flight per phase.
    pub concurrency: usize,
    pub min_fragment_chars: usize,
    /// How long a finished job stays visible to pollers.
    pub job_retention_secs: u64,
    /// Running work older than this is swept even if it never settled.
    pub running_work_max_age_secs: u64,
    pub sweep_interval_secs: u64,
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            min_fragment_chars: DEFAULT_MIN_FRAGMENT_CHARS,
            job_retention_secs: 30,
            running_work_max_age_secs: 600,
            sweep_interval_secs: 60,
            event_capacity: 256,
        }
    }
}

impl PipelineConfig {
    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn running_work_max_age(&self) -> Duration {
        Duration::from_secs(self.running_work_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
