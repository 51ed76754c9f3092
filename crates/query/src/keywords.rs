//! Keyword heuristics for spotting technical pages.

const TECHNICAL_TOPICS: &[&str] = &[
    "programming",
    "software",
    "code",
    "api",
    "algorithm",
    "database",
    "framework",
    "library",
    "compiler",
    "debugging",
    "deployment",
    "devops",
    "kubernetes",
    "docker",
    "rust",
    "python",
    "javascript",
    "typescript",
    "web development",
    "machine learning",
    "data structure",
    "testing",
];

const TECHNICAL_ENTITY_TYPES: &[&str] = &[
    "technology",
    "software",
    "programming_language",
    "language",
    "library",
    "framework",
    "tool",
    "api",
    "protocol",
    "function",
    "class",
    "module",
    "package",
];

const TECHNICAL_DOMAINS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "stackoverflow.com",
    "stackexchange.com",
    "dev.to",
    "docs.rs",
    "crates.io",
    "npmjs.com",
    "pypi.org",
    "readthedocs.io",
    "developer.mozilla.org",
];

const TECHNICAL_HOST_PREFIXES: &[&str] = &["docs.", "developer.", "developers.", "api.", "dev."];

pub fn is_technical_topic(topic: &str) -> bool {
    let topic = topic.to_lowercase();
    TECHNICAL_TOPICS.iter().any(|k| topic.contains(k))
}

pub fn is_technical_entity_type(entity_type: &str) -> bool {
    let entity_type = entity_type.to_lowercase().replace([' ', '-'], "_");
    TECHNICAL_ENTITY_TYPES.iter().any(|k| entity_type == *k)
}

pub fn is_technical_domain(host: &str) -> bool {
    let host = host.to_lowercase();
    TECHNICAL_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
        || TECHNICAL_HOST_PREFIXES.iter().any(|p| host.starts_with(p))
}
