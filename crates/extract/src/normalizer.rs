use reqwest::Url;

/// Normalize a URL for work dedup and caching: scheme, host, path and query
/// with the fragment stripped. Host is lowercased and a trailing slash on a
/// non-root path is dropped.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();

    let Ok(mut parsed) = Url::parse(trimmed) else {
        return strip_fragment(trimmed);
    };

    parsed.set_fragment(None);
    if let Some(host) = parsed.host_str().map(|h| h.to_ascii_lowercase()) {
        if parsed.set_host(Some(&host)).is_err() {
            return strip_fragment(trimmed);
        }
    }
    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(&path[..path.len() - 1]);
    }

    parsed.to_string()
}

/// Textual fallback for input `Url` cannot handle: fragments still never
/// distinguish two URLs.
fn strip_fragment(input: &str) -> String {
    input.split('#').next().unwrap_or(input).to_string()
}

/// Lowercased hostname of a URL, if it has one.
pub fn hostname(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Identity key for entity names.
pub fn entity_key(name: &str) -> String {
    name.to_lowercase()
}
