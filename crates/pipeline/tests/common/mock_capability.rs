use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use extract::{ContentMetrics, Entity, ExtractionCapability, PartialKnowledge, Phase, Relationship};
use ingest::ExtractionInput;

/// Deterministic capability: every input yields one entity named after its
/// first word and a summary echoing its text.
#[derive(Default)]
pub struct MockCapability {
    calls: AtomicUsize,
    phases: Mutex<Vec<Phase>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    fail_on: Option<Phase>,
}

impl MockCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, phase: Phase) -> Self {
        self.fail_on = Some(phase);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn phases_seen(&self) -> Vec<Phase> {
        let mut phases = self.phases.lock().unwrap().clone();
        phases.dedup();
        phases
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionCapability for MockCapability {
    async fn extract(&self, input: &ExtractionInput, phase: Phase) -> Result<PartialKnowledge> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.phases.lock().unwrap().push(phase);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on == Some(phase) {
            bail!("model unavailable");
        }

        let first_word = input.text.split_whitespace().next().unwrap_or("Nothing").to_string();
        Ok(PartialKnowledge {
            entities: Some(vec![Entity::new(first_word.clone(), "CONCEPT", 0.7)]),
            relationships: Some(vec![Relationship::new(first_word.clone(), "appears_in", input.title.clone(), 0.9)]),
            topics: Some(vec![format!("{} topic", phase)]),
            suggested_questions: None,
            summary: Some(format!("{} summary: {}", phase, input.text)),
            content_actions: None,
            content_metrics: Some(ContentMetrics::from_word_count(input.word_count())),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
