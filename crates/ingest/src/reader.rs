use std::sync::LazyLock;

use regex::Regex;

static HIDDEN_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|template)\b[^>]*>.*?</(script|style|noscript|template)\s*>")
        .expect("hidden block pattern")
});
static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern"));
static BLOCK_BOUNDARIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6]|/section|/article|/tr|/pre|/blockquote)\b[^>]*>")
        .expect("block boundary pattern")
});
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"));
static CODE_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*(pre|code)\b").expect("code tag pattern"));
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f\v]+").expect("space pattern"));

/// Turns raw HTML fragments into plain text suitable for extraction.
pub struct FragmentReader;

impl FragmentReader {
    /// Extract visible text, keeping paragraph breaks as blank lines.
    pub fn extract_text(html: &str) -> String {
        let text = HIDDEN_BLOCKS.replace_all(html, " ");
        let text = COMMENTS.replace_all(&text, " ");
        let text = BLOCK_BOUNDARIES.replace_all(&text, "\n\n");
        let text = TAGS.replace_all(&text, " ");
        let text = decode_entities(&text);

        let mut paragraphs = Vec::new();
        for block in text.split("\n\n") {
            let line = block
                .lines()
                .map(|l| INLINE_SPACE.replace_all(l.trim(), " ").into_owned())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !line.is_empty() {
                paragraphs.push(line);
            }
        }

        paragraphs.join("\n\n")
    }

    pub fn contains_code(html: &str) -> bool {
        CODE_TAGS.is_match(html)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
