use crate::chunk::{DocumentPart, estimate_tokens};

pub struct ChunkerConfig {
    pub target_tokens_max: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens_max: 400,
        }
    }
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split fragment text into parts along paragraph boundaries.
    ///
    /// Offsets always point back into `text`; a single paragraph larger than the
    /// token budget becomes its own part rather than being cut mid-sentence.
    pub fn chunk_text(&self, source_url: &str, text: &str) -> Vec<DocumentPart> {
        let mut parts = Vec::new();
        let mut buffer: Option<(usize, usize)> = None; // (start, end) of pending span
        let mut cursor = 0;

        for para in self.split_by_paragraphs(text) {
            let Some(found) = text[cursor..].find(para) else {
                continue;
            };
            let start = cursor + found;
            let end = start + para.len();
            cursor = end;

            match buffer {
                Some((buf_start, buf_end)) => {
                    let pending = estimate_tokens(&text[buf_start..buf_end]);
                    if pending + estimate_tokens(para) > self.config.target_tokens_max {
                        parts.push(self.make_part(source_url, text, buf_start, buf_end));
                        buffer = Some((start, end));
                    } else {
                        buffer = Some((buf_start, end));
                    }
                }
                None => buffer = Some((start, end)),
            }
        }

        // Flush remaining buffer
        if let Some((start, end)) = buffer {
            parts.push(self.make_part(source_url, text, start, end));
        }

        parts
    }

    fn make_part(&self, source_url: &str, text: &str, start: usize, end: usize) -> DocumentPart {
        DocumentPart::new(source_url, text[start..end].to_string(), (start, end))
    }

    fn split_by_paragraphs<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.split("\n\n")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
