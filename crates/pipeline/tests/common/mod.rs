//! Shared fixtures for the pipeline integration tests.

pub mod mock_capability;

pub use mock_capability::MockCapability;

/// An HTML fragment with enough visible text to survive filtering.
pub fn long_fragment(text: &str) -> String {
    format!("<div><p>{}</p><p>This paragraph pads the fragment past the minimum length.</p></div>", text)
}

/// A fragment that is dropped by the 50-character filter.
pub fn short_fragment() -> String {
    "<div><span>Too short</span></div>".to_string()
}
