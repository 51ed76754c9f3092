use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A pre-chunked slice of fragment text. Page stores keep these boundaries
/// once a page has been indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPart {
    pub part_id: String,
    pub text: String,
    pub offset: (usize, usize), // [start, end) byte positions in the fragment text
}

impl DocumentPart {
    pub fn new(source_url: &str, text: String, offset: (usize, usize)) -> Self {
        // Generate stable part_id from content
        let part_id = Self::generate_part_id(source_url, &text, offset);

        Self {
            part_id,
            text,
            offset,
        }
    }

    fn generate_part_id(source_url: &str, text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_url.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    /// Estimate token count (rough: 1.3 tokens per word)
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

pub(crate) fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 * 1.3) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_id_is_stable() {
        let a = DocumentPart::new("https://x.com/#frame-0", "hello world".into(), (0, 11));
        let b = DocumentPart::new("https://x.com/#frame-0", "hello world".into(), (0, 11));
        let c = DocumentPart::new("https://x.com/#frame-1", "hello world".into(), (0, 11));

        assert_eq!(a.part_id, b.part_id);
        assert_ne!(a.part_id, c.part_id);
        assert_eq!(a.part_id.len(), 32);
    }
}
