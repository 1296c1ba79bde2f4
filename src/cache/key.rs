//! Composite cache keys
//!
//! Keys are the operation name followed by its parameters in a fixed order,
//! joined by `:`. Parameter values are used verbatim (no re-encoding, case
//! preserved) so identical requests always map to the same key.

use std::fmt;

/// Delimiter between key segments
pub const KEY_DELIMITER: char = ':';

/// Builder for a composite cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Starts a key with the operation prefix
    pub fn new(prefix: &str) -> Self {
        Self(prefix.to_string())
    }

    /// Appends a bare segment
    pub fn segment(mut self, value: &str) -> Self {
        self.0.push(KEY_DELIMITER);
        self.0.push_str(value);
        self
    }

    /// Appends `name:value`
    pub fn param(self, name: &str, value: &str) -> Self {
        self.segment(name).segment(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
