//! Registry of named lazy builders.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RenderContext;
use crate::error::BuildError;
use crate::fragment::Fragment;

/// A lazy builder invoked at final output assembly.
///
/// Builders must be side-effect-free with respect to each other so that
/// placeholders can be substituted in any order, and must not read or
/// write the render cache themselves; caching is the dispatcher's job.
#[async_trait]
pub trait LazyBuild: Send + Sync {
    /// Produce the deferred fragment.
    async fn build(&self, ctx: &RenderContext, args: &[String]) -> Result<Fragment, BuildError>;
}

/// Wraps an async closure as a [`LazyBuild`].
///
/// The closure receives an owned context and arguments so the returned
/// future can outlive the dispatcher's borrow.
pub struct BuilderFn<F> {
    f: F,
}

impl<F, Fut> BuilderFn<F>
where
    F: Fn(RenderContext, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fragment, BuildError>> + Send,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> LazyBuild for BuilderFn<F>
where
    F: Fn(RenderContext, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fragment, BuildError>> + Send,
{
    async fn build(&self, ctx: &RenderContext, args: &[String]) -> Result<Fragment, BuildError> {
        (self.f)(ctx.clone(), args.to_vec()).await
    }
}

/// Maps stable identifiers to builder implementations.
///
/// Builders are resolved once at registration time; dispatch is a map
/// lookup, never reflection on names at render time.
#[derive(Clone, Default)]
pub struct BuilderRegistry {
    builders: HashMap<String, Arc<dyn LazyBuild>>,
}

impl BuilderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under an identifier. Last registration wins.
    pub fn register(&mut self, id: impl Into<String>, builder: Arc<dyn LazyBuild>) {
        self.builders.insert(id.into(), builder);
    }

    /// Register an async closure under an identifier.
    pub fn register_fn<F, Fut>(&mut self, id: impl Into<String>, f: F)
    where
        F: Fn(RenderContext, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Fragment, BuildError>> + Send + 'static,
    {
        self.register(id, Arc::new(BuilderFn::new(f)));
    }

    /// Look up a builder by identifier.
    pub fn get(&self, id: &str) -> Option<Arc<dyn LazyBuild>> {
        self.builders.get(id).cloned()
    }

    /// Whether an identifier is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.builders.contains_key(id)
    }

    /// Number of registered builders.
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("BuilderRegistry").field("ids", &ids).finish()
    }
}
