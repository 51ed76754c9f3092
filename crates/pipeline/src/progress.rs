use std::collections::HashMap;

use chrono::{DateTime, Utc};
use extract::{AggregatedKnowledge, Phase};
use ingest::InputSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One progress notification for an extraction job.
///
/// `incremental_data` is a full snapshot of the job's knowledge; consumers
/// replace their view with it rather than merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub extraction_id: String,
    pub phase: Phase,
    pub total_items: usize,
    pub processed_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(default)]
    pub errors: Vec<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_data: Option<AggregatedKnowledge>,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub source: InputSource,
}

/// Drops progress events that carry nothing newer than what a consumer
/// already saw. Events are ordered by phase, then by `processed_items`.
#[derive(Debug, Default)]
pub struct ProgressWatermark {
    seen: HashMap<String, (Phase, usize)>,
}

impl ProgressWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the event should be applied.
    pub fn accept(&mut self, event: &ProgressEvent) -> bool {
        let mark = (event.phase, event.processed_items);
        match self.seen.get(&event.extraction_id) {
            Some(last) if mark <= *last => false,
            _ => {
                self.seen.insert(event.extraction_id.clone(), mark);
                true
            }
        }
    }

    pub fn forget(&mut self, extraction_id: &str) {
        self.seen.remove(extraction_id);
    }
}
