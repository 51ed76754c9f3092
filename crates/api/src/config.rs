use std::str::FromStr;

use anyhow::{Context, Result, bail};
use communities::CommunityAlgorithm;
use extract::RetryConfig;
use index::GraphBuildConfig;
use pipeline::PipelineConfig;
use query::DiscoveryConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub graph: GraphConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => bail!("Unknown log format: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub algorithm: CommunityAlgorithm,
    pub detect_communities: bool,
}

impl GraphConfig {
    pub fn build_config(&self) -> GraphBuildConfig {
        GraphBuildConfig {
            detect_communities: self.detect_communities,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
                log_format: LogFormat::Pretty,
            },
            llm: LlmConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
            },
            retry: RetryConfig::default(),
            pipeline: PipelineConfig::default(),
            graph: GraphConfig {
                algorithm: CommunityAlgorithm::default(),
                detect_communities: true,
            },
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.server.log_format = format.parse()?;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            config.llm.model = model;
        }
        if let Some(value) = parse(&lookup, "EXTRACTION_CONCURRENCY")? {
            config.pipeline.concurrency = value;
        }
        if let Some(value) = parse(&lookup, "MIN_FRAGMENT_CHARS")? {
            config.pipeline.min_fragment_chars = value;
        }
        if let Some(value) = parse(&lookup, "JOB_RETENTION_SECS")? {
            config.pipeline.job_retention_secs = value;
        }
        if let Some(value) = parse(&lookup, "RUNNING_WORK_MAX_AGE_SECS")? {
            config.pipeline.running_work_max_age_secs = value;
        }
        if let Some(algorithm) = lookup("COMMUNITY_ALGORITHM") {
            config.graph.algorithm = algorithm.parse()?;
        }
        if let Some(value) = parse(&lookup, "DETECT_COMMUNITIES")? {
            config.graph.detect_communities = value;
        }

        if config.pipeline.concurrency == 0 {
            bail!("EXTRACTION_CONCURRENCY must be at least 1");
        }

        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("Invalid value for {}: {:?}", key, raw)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.pipeline.concurrency, 3);
        assert_eq!(config.pipeline.min_fragment_chars, 50);
        assert_eq!(config.pipeline.job_retention_secs, 30);
        assert_eq!(config.pipeline.running_work_max_age_secs, 600);
        assert_eq!(config.graph.algorithm, CommunityAlgorithm::Louvain);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("LOG_FORMAT", "json"),
            ("EXTRACTION_CONCURRENCY", "5"),
            ("COMMUNITY_ALGORITHM", "label_propagation"),
            ("DETECT_COMMUNITIES", "false"),
        ]))
        .unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.pipeline.concurrency, 5);
        assert_eq!(config.graph.algorithm, CommunityAlgorithm::LabelPropagation);
        assert!(!config.graph.build_config().detect_communities);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("MIN_FRAGMENT_CHARS", "lots")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("EXTRACTION_CONCURRENCY", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("COMMUNITY_ALGORITHM", "magic")])).is_err());
    }
}
