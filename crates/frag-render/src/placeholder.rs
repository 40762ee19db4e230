//! Placeholder tokens and the per-render registration map.

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use frag_cache::PlaceholderSpec;
use frag_core::LazyRef;
use sha2::{Digest, Sha256};

/// Mint the placeholder token for a deferred fragment.
///
/// The token is a hash of a stable seed (builder identity, arguments, and
/// cache keys), so the same logical placeholder reuses the same token
/// within one render pass, and the marker cannot collide with ordinary
/// markup.
pub fn mint_token(lazy: &LazyRef, cache_keys: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(lazy.builder.as_bytes());
    for arg in &lazy.args {
        hasher.update([0u8]);
        hasher.update(arg.as_bytes());
    }
    hasher.update([1u8]);
    for key in cache_keys {
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
    }
    let digest = URL_SAFE_NO_PAD.encode(hasher.finalize());
    format!("<frag-placeholder token=\"{}\"/>", digest)
}

/// Per-render-pass map from placeholder token to its registration.
///
/// Registration is idempotent: registering the same token twice keeps the
/// last registration (in practice identical, since the token seeds on the
/// builder and its arguments). Each registration is consumed exactly once
/// during substitution.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderRegistry {
    specs: HashMap<String, PlaceholderSpec>,
}

impl PlaceholderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from the placeholder specs of a cached entry.
    pub fn from_specs(specs: Vec<PlaceholderSpec>) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec);
        }
        registry
    }

    /// Register a placeholder. Last registration wins.
    pub fn register(&mut self, spec: PlaceholderSpec) {
        self.specs.insert(spec.token.clone(), spec);
    }

    /// Remove and return every registration whose token occurs in `output`.
    pub fn drain_for(&mut self, output: &str) -> Vec<PlaceholderSpec> {
        let tokens: Vec<String> = self
            .specs
            .keys()
            .filter(|token| output.contains(token.as_str()))
            .cloned()
            .collect();
        tokens
            .into_iter()
            .filter_map(|token| self.specs.remove(&token))
            .collect()
    }

    /// The current registrations, for storing alongside a cached output.
    pub fn specs(&self) -> Vec<PlaceholderSpec> {
        self.specs.values().cloned().collect()
    }

    /// Whether any registrations remain.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.specs.len()
    }
}
