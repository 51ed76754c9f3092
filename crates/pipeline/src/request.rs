use extract::ExtractionMode;
use ingest::InputSource;
use serde::{Deserialize, Serialize};

/// Extraction request as sent by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mode: ExtractionMode,
    /// Generated when absent.
    #[serde(default)]
    pub extraction_id: Option<String>,
    #[serde(default)]
    pub html_fragments: Vec<String>,
    #[serde(default)]
    pub extraction_settings: Option<ExtractionSettings>,
    #[serde(default)]
    pub save_to_index: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSettings {
    pub min_fragment_chars: Option<usize>,
    pub source: Option<InputSource>,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>, title: impl Into<String>, mode: ExtractionMode, fragments: Vec<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            mode,
            extraction_id: None,
            html_fragments: fragments,
            extraction_settings: None,
            save_to_index: None,
        }
    }

    /// Persist unless the caller explicitly opted out.
    pub fn should_persist(&self) -> bool {
        self.save_to_index != Some(false)
    }

    pub fn source(&self) -> InputSource {
        self.extraction_settings
            .as_ref()
            .and_then(|s| s.source)
            .unwrap_or_default()
    }

    pub fn min_fragment_chars(&self, default: usize) -> usize {
        self.extraction_settings
            .as_ref()
            .and_then(|s| s.min_fragment_chars)
            .unwrap_or(default)
    }
}
