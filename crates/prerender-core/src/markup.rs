//! Trusted markup produced by a render.

use std::fmt;

/// Markup returned by a component render.
///
/// The text comes from trusted component code and is not escaped again when
/// embedded into a page. Only the renderer can construct one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeHtml(String);

impl SafeHtml {
    pub(crate) fn new(markup: String) -> Self {
        Self(markup)
    }

    /// The markup text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper, returning the markup.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Length of the markup in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the component rendered nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeHtml {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
