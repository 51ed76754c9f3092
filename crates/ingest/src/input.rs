use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::DocumentPart;

/// Where the page content came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    #[default]
    Direct,
    Index,
    Bookmark,
    History,
    Import,
}

/// One unit of extraction work: a single HTML fragment of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionInput {
    /// Page URL qualified with the fragment, e.g. `https://x.com/a#frame-1`.
    pub url: String,
    pub title: String,
    pub text: String,
    pub document_parts: Option<Vec<DocumentPart>>,
    pub source: InputSource,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_code: bool,
}

impl ExtractionInput {
    pub fn word_count(&self) -> usize {
        self.text.unicode_words().count()
    }
}
