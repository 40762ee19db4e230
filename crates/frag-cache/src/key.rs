//! Cache key composition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema version folded into every key, so structural changes to cached
/// output invalidate old entries automatically.
pub const KEY_SCHEMA_VERSION: &str = "v1";

/// A cache key uniquely identifying a stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The computed key string.
    key: String,
    /// Components that make up the key (for debugging).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    components: Vec<String>,
}

impl CacheKey {
    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the key components (for debugging).
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Builder for composing cache keys from declared keys and resolved
/// context values.
///
/// Context pairs are kept sorted so the same logical key always produces
/// the same string regardless of insertion order.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    schema: String,
    keys: Vec<String>,
    contexts: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Create a builder with the default schema version.
    pub fn new() -> Self {
        Self {
            schema: KEY_SCHEMA_VERSION.to_string(),
            keys: Vec::new(),
            contexts: BTreeMap::new(),
        }
    }

    /// Override the schema version component.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Append a declared cache key. Order is preserved.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Append several declared cache keys.
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Add a resolved context value.
    pub fn context(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.contexts.insert(kind.into(), value.into());
        self
    }

    /// Add several resolved context values.
    pub fn contexts(mut self, resolved: BTreeMap<String, String>) -> Self {
        self.contexts.extend(resolved);
        self
    }

    /// Build the cache key.
    pub fn build(&self) -> CacheKey {
        let mut parts = vec![self.schema.clone()];
        let mut components = vec![format!("schema:{}", self.schema)];

        for key in &self.keys {
            parts.push(key.clone());
            components.push(format!("key:{}", key));
        }

        for (kind, value) in &self.contexts {
            parts.push(format!("[{}]={}", kind, value));
            components.push(format!("context:{}={}", kind, value));
        }

        CacheKey {
            key: parts.join("|"),
            components,
        }
    }
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
