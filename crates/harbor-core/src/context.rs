//! Request metadata for fresh connections.

use std::collections::HashMap;

/// Metadata from the HTTP request that initiated an upgrade.
///
/// Handed to [`Session::create_data`](crate::Session::create_data) for
/// brand-new connections. Resumed connections never see one; their data
/// comes from the attachment. Header names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ConnectContext {
    uri: String,
    headers: HashMap<String, String>,
}

impl ConnectContext {
    /// Create a context for the given request URI.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: HashMap::new(),
        }
    }

    /// Attach a request header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Attach a request header in place.
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// The request URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Look up a request header by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
