//! Cached entries and context redirects.

use std::collections::BTreeSet;

use frag_core::Cacheability;
use serde::{Deserialize, Serialize};

/// Registration record for a deferred fragment, carried inside cached
/// page entries so a cache hit can re-resolve its placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderSpec {
    /// The placeholder token embedded in the output.
    pub token: String,
    /// Registry identifier of the lazy builder.
    pub builder: String,
    /// Arguments passed to the builder.
    pub args: Vec<String>,
    /// Cache keys for caching the builder's output independently.
    pub cache_keys: Vec<String>,
    /// Cacheability declared on the deferred fragment.
    pub cacheability: Cacheability,
}

/// A rendered output stored in the cache.
///
/// Entries are immutable once written; they are only replaced by a fresh
/// write after a tag invalidation evicted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedOutput {
    /// The rendered output, possibly still containing placeholder tokens.
    pub output: String,
    /// Cacheability of the stored output.
    pub cacheability: Cacheability,
    /// Placeholders that remain to be substituted in `output`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub placeholders: Vec<PlaceholderSpec>,
    /// When the entry was created (Unix seconds).
    pub created_at: u64,
}

impl CachedOutput {
    /// Create a new entry stamped with the current time.
    pub fn new(output: impl Into<String>, cacheability: Cacheability) -> Self {
        Self {
            output: output.into(),
            cacheability,
            placeholders: Vec::new(),
            created_at: current_timestamp(),
        }
    }

    /// Attach the placeholders still present in the output.
    pub fn with_placeholders(mut self, placeholders: Vec<PlaceholderSpec>) -> Self {
        self.placeholders = placeholders;
        self
    }

    /// Whether the entry's freshness bound has passed.
    pub fn is_expired(&self) -> bool {
        match self.cacheability.max_age.as_secs() {
            Some(secs) => current_timestamp() > self.created_at + secs,
            None => !self.cacheability.max_age.allows_caching(),
        }
    }

    /// Age in seconds.
    pub fn age(&self) -> u64 {
        current_timestamp().saturating_sub(self.created_at)
    }
}

/// What a backend stores under a key.
///
/// When an output varies by contexts, the context-free base key holds a
/// redirect recording which kinds to resolve; the full entry lives under
/// the key extended with the resolved values. Readers follow at most one
/// hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CacheEntry {
    /// A stored rendered output.
    Output(CachedOutput),
    /// Context kinds the reader must resolve to reach the full entry.
    Redirect {
        /// The context kinds to resolve.
        contexts: BTreeSet<String>,
    },
}

impl CacheEntry {
    /// The tags attached to this entry, if any.
    pub fn tags(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Output(out) => Some(&out.cacheability.tags),
            Self::Redirect { .. } => None,
        }
    }
}

pub(crate) fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
