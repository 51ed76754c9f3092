use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ingest::ExtractionInput;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::ExtractionCapability;
use crate::mode::Phase;
use crate::prompt;
use crate::retry::RetryPolicy;
use crate::schema::{ContentMetrics, PartialKnowledge};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("code fence pattern"));

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String, // "json" for structured output
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new("http://localhost:11434".to_string(), "llama3".to_string())
    }
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate a completion, retrying transport failures with backoff.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let this = self;
        self.retry
            .retry("ollama_generate", move || this.generate_once(prompt))
            .await
    }

    async fn generate_once(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json".to_string(), // Force JSON output
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }

    /// Generate with retry for invalid JSON
    pub async fn generate_json_with_retry(&self, prompt: &str, max_attempts: usize) -> Result<String> {
        let mut response = self.generate(prompt).await?;

        for attempt in 1..=max_attempts {
            let candidate = strip_code_fences(&response);
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Ok(candidate.to_string());
            }

            if attempt == max_attempts {
                break;
            }

            warn!(attempt, model = %self.model, "Model returned invalid JSON, asking for a repair");
            response = self.generate(&prompt::build_retry_prompt(&response)).await?;
        }

        anyhow::bail!("Failed to get valid JSON after {} attempts", max_attempts)
    }
}

/// Extraction capability backed by a local Ollama model.
pub struct OllamaExtractor {
    client: OllamaClient,
    max_json_attempts: usize,
}

impl OllamaExtractor {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            max_json_attempts: 3,
        }
    }
}

#[async_trait]
impl ExtractionCapability for OllamaExtractor {
    async fn extract(&self, input: &ExtractionInput, phase: Phase) -> Result<PartialKnowledge> {
        let prompt = prompt::build_extraction_prompt(phase, &input.title, &input.text);

        let json = self
            .client
            .generate_json_with_retry(&prompt, self.max_json_attempts)
            .await
            .with_context(|| format!("Failed to extract {} phase for {}", phase, input.url))?;

        let mut partial: PartialKnowledge =
            serde_json::from_str(&json).context("Failed to parse extraction result")?;

        if partial.content_metrics.is_none() {
            partial.content_metrics = Some(ContentMetrics::from_word_count(input.word_count()));
        }

        debug!(
            url = %input.url,
            phase = %phase,
            entities = partial.entities.as_ref().map_or(0, Vec::len),
            "Extracted partial knowledge"
        );

        Ok(partial)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Models sometimes wrap JSON in markdown fences despite instructions.
fn strip_code_fences(response: &str) -> &str {
    match CODE_FENCE.captures(response).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => response.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }
}
