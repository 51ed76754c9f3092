pub mod chunk;
pub mod chunker;
pub mod input;
pub mod reader;

pub use chunk::DocumentPart;
pub use chunker::{Chunker, ChunkerConfig};
pub use input::{ExtractionInput, InputSource};
pub use reader::FragmentReader;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Fragments with less extracted text than this are considered noise.
pub const DEFAULT_MIN_FRAGMENT_CHARS: usize = 50;

pub struct FragmentOptions {
    pub min_chars: usize,
    pub source: InputSource,
    pub timestamp: Option<DateTime<Utc>>,
    pub chunker: ChunkerConfig,
}

impl Default for FragmentOptions {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_FRAGMENT_CHARS,
            source: InputSource::Direct,
            timestamp: None,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// Qualify a page URL with a fragment index, replacing any existing fragment.
pub fn qualify_fragment_url(url: &str, index: usize) -> String {
    let base = url.split('#').next().unwrap_or(url);
    format!("{}#frame-{}", base, index)
}

/// Build extraction inputs from the HTML fragments of one page.
///
/// Fragments whose visible text is shorter than `options.min_chars` characters
/// are dropped. Surviving inputs keep the index of their original fragment.
pub fn build_inputs(
    url: &str,
    title: &str,
    fragments: &[String],
    options: &FragmentOptions,
) -> Vec<ExtractionInput> {
    let chunker = Chunker::new(ChunkerConfig {
        target_tokens_max: options.chunker.target_tokens_max,
    });

    let mut inputs = Vec::new();

    for (index, html) in fragments.iter().enumerate() {
        let text = FragmentReader::extract_text(html);
        let chars = text.chars().count();

        if chars < options.min_chars {
            debug!(url, index, chars, "Dropping fragment below minimum length");
            continue;
        }

        let fragment_url = qualify_fragment_url(url, index);
        let parts = chunker.chunk_text(&fragment_url, &text);

        inputs.push(ExtractionInput {
            url: fragment_url,
            title: title.to_string(),
            document_parts: if parts.is_empty() { None } else { Some(parts) },
            text,
            source: options.source,
            timestamp: options.timestamp,
            has_code: FragmentReader::contains_code(html),
        });
    }

    inputs
}
