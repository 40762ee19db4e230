//! Explicit render context with pull-based lookups.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::BuildError;

/// Source of current context values (e.g. who the current user is).
///
/// Implementations may be backed by a request, a session store, or a
/// fixed map in tests. Lookups are read-only; context is never written
/// to during a render.
pub trait ContextProvider: Send + Sync {
    /// Resolve the current value of a context kind.
    fn resolve(&self, kind: &str) -> Option<String>;
}

/// A `BTreeMap`-backed provider for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct MapContextProvider {
    values: BTreeMap<String, String>,
}

impl MapContextProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a context value.
    pub fn with(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(kind.into(), value.into());
        self
    }
}

impl ContextProvider for MapContextProvider {
    fn resolve(&self, kind: &str) -> Option<String> {
        self.values.get(kind).cloned()
    }
}

/// Context handle passed to tree builders and lazy builders.
///
/// All context flows through here explicitly; there is no ambient
/// process-wide state, so a tree renders deterministically given a
/// fixed provider.
#[derive(Clone)]
pub struct RenderContext {
    provider: Arc<dyn ContextProvider>,
}

impl RenderContext {
    /// Create a context over a provider.
    pub fn new(provider: Arc<dyn ContextProvider>) -> Self {
        Self { provider }
    }

    /// Resolve the current value of a context kind.
    pub fn resolve(&self, kind: &str) -> Option<String> {
        self.provider.resolve(kind)
    }

    /// Resolve a context kind, failing the build if it is unavailable.
    pub fn require(&self, kind: &str) -> Result<String, BuildError> {
        self.resolve(kind)
            .ok_or_else(|| BuildError::MissingContext(kind.to_string()))
    }

    /// Resolve several kinds into a sorted map.
    ///
    /// Kinds the provider cannot resolve are omitted, so the result is
    /// deterministic for key derivation.
    pub fn resolve_all<'a, I>(&self, kinds: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        kinds
            .into_iter()
            .filter_map(|kind| self.resolve(kind).map(|value| (kind.clone(), value)))
            .collect()
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext").finish_non_exhaustive()
    }
}
