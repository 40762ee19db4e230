//! The render pipeline: build, aggregate, decide, substitute.

use std::time::Duration;

use frag_cache::{
    CacheKeyBuilder, CacheStatus, CachedOutput, PlaceholderSpec, RenderCache,
};
use frag_core::{
    BuildError, BuilderRegistry, Cacheability, Fragment, FragmentContent, RenderContext,
};
use tracing::debug;

use crate::error::RenderError;
use crate::placeholder::{mint_token, PlaceholderRegistry};
use crate::timing::{RenderPhase, RenderTiming};

/// Default bound on substitution rounds, guarding against cyclic builders.
pub const DEFAULT_MAX_PLACEHOLDER_DEPTH: usize = 8;

/// Default time bound for a single lazy builder invocation.
pub const DEFAULT_BUILDER_TIMEOUT: Duration = Duration::from_secs(5);

/// A fully assembled render.
#[derive(Debug)]
pub struct RenderedPage {
    /// The final output, with every placeholder substituted.
    pub output: String,
    /// Aggregated cacheability of everything that went into the output.
    pub cacheability: Cacheability,
    /// Page-level cache status (placeholder-level caching is separate).
    pub cache_status: CacheStatus,
    /// Phase timing for this render.
    pub timing: RenderTiming,
}

/// Renders fragment trees through the render cache.
///
/// Each `render` call is an independent unit of work; the only state
/// shared between concurrent renders is the cache. Within one render the
/// pipeline is strict: building precedes aggregation precedes
/// substitution, and no phase is re-entered.
#[derive(Clone)]
pub struct Renderer {
    builders: BuilderRegistry,
    cache: RenderCache,
    max_placeholder_depth: usize,
    builder_timeout: Duration,
}

impl Renderer {
    /// Create a renderer over a builder registry and a cache.
    pub fn new(builders: BuilderRegistry, cache: RenderCache) -> Self {
        Self {
            builders,
            cache,
            max_placeholder_depth: DEFAULT_MAX_PLACEHOLDER_DEPTH,
            builder_timeout: DEFAULT_BUILDER_TIMEOUT,
        }
    }

    /// Bound the number of substitution rounds.
    pub fn with_max_placeholder_depth(mut self, depth: usize) -> Self {
        self.max_placeholder_depth = depth;
        self
    }

    /// Bound the duration of a single builder invocation.
    pub fn with_builder_timeout(mut self, timeout: Duration) -> Self {
        self.builder_timeout = timeout;
        self
    }

    /// The cache this renderer writes through.
    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Render a fragment tree to final output.
    ///
    /// Returns the output together with the aggregated cacheability of
    /// everything substituted into it, so a serving layer can derive
    /// response headers or an outer cache key from it.
    pub async fn render(
        &self,
        tree: &Fragment,
        ctx: &RenderContext,
    ) -> Result<RenderedPage, RenderError> {
        if tree.is_deferred() {
            return Err(RenderError::DeferredRoot);
        }

        let mut timing = RenderTiming::start();

        // A page cache hit replaces the build pass entirely; the stored
        // body still contains its placeholder tokens.
        let cached = if tree.cache_keys.is_empty() {
            None
        } else {
            self.cache.lookup(&tree.cache_keys, ctx).await
        };

        let (mut output, committed, mut registry, page_hit) = match cached {
            Some((entry, key)) => {
                debug!(key = key.as_str(), "page cache hit");
                let registry = PlaceholderRegistry::from_specs(entry.placeholders);
                (entry.output, entry.cacheability, registry, true)
            }
            None => {
                let mut registry = PlaceholderRegistry::new();
                let (output, committed) = walk(tree, &tree.cacheability, &mut registry);
                (output, committed, registry, false)
            }
        };

        timing.mark(RenderPhase::Aggregating);
        let mut cacheability = committed.clone();
        for spec in registry.specs() {
            cacheability.merge(&spec.cacheability);
        }

        timing.mark(RenderPhase::CacheDecision);
        let cache_status = if page_hit {
            CacheStatus::Hit
        } else if tree.cache_keys.is_empty() || !committed.allows_caching() {
            CacheStatus::Bypass
        } else {
            let entry = CachedOutput::new(output.clone(), committed.clone())
                .with_placeholders(registry.specs());
            let key = self.cache.store(&tree.cache_keys, ctx, entry).await;
            debug!(key = key.as_str(), "page stored");
            CacheStatus::Miss
        };

        timing.mark(RenderPhase::Substituting);
        let mut depth = 0;
        while !registry.is_empty() {
            let pending = registry.drain_for(&output);
            if pending.is_empty() {
                break;
            }
            if depth >= self.max_placeholder_depth {
                return Err(RenderError::PlaceholderCycle {
                    token: pending[0].token.clone(),
                    depth,
                });
            }
            for spec in pending {
                let (rendered, builder_cacheability) =
                    self.dispatch(&spec, ctx, &mut registry).await?;
                output = output.replace(&spec.token, &rendered);
                cacheability.merge(&builder_cacheability);
            }
            depth += 1;
        }

        timing.mark(RenderPhase::Done);
        debug!(status = %cache_status, elapsed = ?timing.elapsed(), "render complete");

        Ok(RenderedPage {
            output,
            cacheability,
            cache_status,
            timing,
        })
    }

    /// Invoke the builder behind a placeholder, through the cache when
    /// the placeholder declares its own cache keys.
    ///
    /// Returns the builder's rendered output (which may contain further
    /// tokens, registered before returning) and its cacheability.
    async fn dispatch(
        &self,
        spec: &PlaceholderSpec,
        ctx: &RenderContext,
        registry: &mut PlaceholderRegistry,
    ) -> Result<(String, Cacheability), RenderError> {
        let builder = self.builders.get(&spec.builder).ok_or_else(|| {
            RenderError::build(
                spec.builder.clone(),
                BuildError::UnknownBuilder(spec.builder.clone()),
            )
        })?;

        if spec.cache_keys.is_empty() {
            let fragment = tokio::time::timeout(self.builder_timeout, builder.build(ctx, &spec.args))
                .await
                .map_err(|_| RenderError::Timeout {
                    builder: spec.builder.clone(),
                    timeout: self.builder_timeout,
                })?
                .map_err(|source| RenderError::build(spec.builder.clone(), source))?;

            let (output, built) = walk(&fragment, &spec.cacheability, registry);
            return Ok((output, built.merged(&spec.cacheability)));
        }

        // The placeholder declares cache keys: its output is cached under
        // its own key, independent of the page's. Context values resolve
        // at substitution time.
        let resolved = ctx.resolve_all(&spec.cacheability.contexts);
        let key = CacheKeyBuilder::new()
            .keys(spec.cache_keys.iter().cloned())
            .contexts(resolved)
            .build();

        let builder_id = spec.builder.clone();
        let args = spec.args.clone();
        let declared = spec.cacheability.clone();
        let compute_ctx = ctx.clone();
        let compute = move || async move {
            let fragment = builder
                .build(&compute_ctx, &args)
                .await
                .map_err(|err| frag_cache::CacheError::ComputeFailed(err.to_string()))?;
            let mut nested = PlaceholderRegistry::new();
            let (output, built) = walk(&fragment, &declared, &mut nested);
            Ok(CachedOutput::new(output, built.merged(&declared))
                .with_placeholders(nested.specs()))
        };

        let (entry, status) =
            tokio::time::timeout(self.builder_timeout, self.cache.get_or_compute(&key, compute))
                .await
                .map_err(|_| RenderError::Timeout {
                    builder: builder_id.clone(),
                    timeout: self.builder_timeout,
                })?
                .map_err(|err| {
                    RenderError::build(builder_id.clone(), BuildError::failed(builder_id, err))
                })?;

        debug!(
            key = key.as_str(),
            %status,
            builder = spec.builder.as_str(),
            "dispatched lazy builder"
        );

        for nested_spec in entry.placeholders {
            registry.register(nested_spec);
        }
        Ok((entry.output, entry.cacheability))
    }
}

/// Top-down build pass over a fragment tree.
///
/// Markup is inlined, children are recursed in order, and deferred nodes
/// are replaced by placeholder tokens and registered. `committed` is the
/// cacheability already fixed for the ancestors, known pre-order, against
/// which each deferred child's narrowness is decided. Returns the
/// assembled (tokenized) output and the cacheability committed by the
/// eager content.
fn walk(
    fragment: &Fragment,
    committed: &Cacheability,
    registry: &mut PlaceholderRegistry,
) -> (String, Cacheability) {
    match &fragment.content {
        FragmentContent::Markup(text) => (text.clone(), fragment.cacheability.clone()),
        FragmentContent::Children(children) => {
            let child_committed = committed.clone().merged(&fragment.cacheability);
            let mut output = String::new();
            let mut total = fragment.cacheability.clone();
            for child in children {
                let (child_output, child_cacheability) = walk(child, &child_committed, registry);
                output.push_str(&child_output);
                total.merge(&child_cacheability);
            }
            (output, total)
        }
        FragmentContent::Deferred(lazy) => {
            let token = mint_token(lazy, &fragment.cache_keys);
            let narrower = !fragment.cacheability.is_subsumed_by(committed);
            debug!(
                builder = lazy.builder.as_str(),
                narrower, "deferred fragment replaced by placeholder"
            );
            registry.register(PlaceholderSpec {
                token: token.clone(),
                builder: lazy.builder.clone(),
                args: lazy.args.clone(),
                cache_keys: fragment.cache_keys.clone(),
                cacheability: fragment.cacheability.clone(),
            });
            // A deferred child no narrower than its container is safe to
            // account for eagerly; a narrower one bubbles its metadata at
            // substitution time instead, keeping it out of the page key.
            let contributed = if narrower {
                Cacheability::permanent()
            } else {
                fragment.cacheability.clone()
            };
            (token, contributed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frag_cache::MemoryBackend;
    use frag_core::{MapContextProvider, MaxAge};
    use std::sync::Arc;

    fn ctx(user: &str) -> RenderContext {
        RenderContext::new(Arc::new(MapContextProvider::new().with("user", user)))
    }

    fn greeting_builders() -> BuilderRegistry {
        let mut builders = BuilderRegistry::new();
        builders.register_fn("greeting", |ctx: RenderContext, _args| async move {
            let name = ctx.require("user")?;
            Ok(Fragment::markup(name))
        });
        builders
    }

    fn renderer(builders: BuilderRegistry) -> Renderer {
        Renderer::new(builders, RenderCache::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_static_tree_renders_inline() {
        let tree = Fragment::container(vec![
            Fragment::markup("This content is "),
            Fragment::markup("the same for everyone."),
        ]);

        let page = renderer(BuilderRegistry::new())
            .render(&tree, &ctx("Alice"))
            .await
            .unwrap();
        assert_eq!(page.output, "This content is the same for everyone.");
        assert_eq!(page.cache_status, CacheStatus::Bypass);
        assert_eq!(page.cacheability, Cacheability::permanent());
    }

    #[tokio::test]
    async fn test_deferred_root_is_rejected() {
        let tree = Fragment::deferred("greeting", vec![]);
        let err = renderer(greeting_builders())
            .render(&tree, &ctx("Alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::DeferredRoot));
    }

    #[tokio::test]
    async fn test_unknown_builder_fails_the_render() {
        let tree = Fragment::container(vec![Fragment::deferred("missing", vec![])]);
        let err = renderer(BuilderRegistry::new())
            .render(&tree, &ctx("Alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Build { node, .. } if node == "missing"));
    }

    #[tokio::test]
    async fn test_substituted_output_has_no_tokens() {
        let tree = Fragment::container(vec![
            Fragment::markup("Hello "),
            Fragment::deferred("greeting", vec![]).with_context("user"),
        ]);

        let page = renderer(greeting_builders())
            .render(&tree, &ctx("Alice"))
            .await
            .unwrap();
        assert_eq!(page.output, "Hello Alice");
        assert!(!page.output.contains("frag-placeholder"));
    }

    #[tokio::test]
    async fn test_cycle_guard_trips_on_self_referential_builder() {
        let mut builders = BuilderRegistry::new();
        builders.register_fn("loop", |_ctx, _args| async {
            Ok(Fragment::container(vec![Fragment::deferred("loop", vec![])]))
        });

        let tree = Fragment::container(vec![Fragment::deferred("loop", vec![])]);
        let err = renderer(builders)
            .render(&tree, &ctx("Alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::PlaceholderCycle { .. }));
    }

    #[tokio::test]
    async fn test_builder_timeout_is_fatal() {
        let mut builders = BuilderRegistry::new();
        builders.register_fn("slow", |_ctx, _args| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Fragment::markup("late"))
        });

        let tree = Fragment::container(vec![Fragment::deferred("slow", vec![])]);
        let renderer = renderer(builders).with_builder_timeout(Duration::from_millis(20));
        let err = renderer.render(&tree, &ctx("Alice")).await.unwrap_err();
        assert!(matches!(err, RenderError::Timeout { builder, .. } if builder == "slow"));
    }

    #[tokio::test]
    async fn test_uncacheable_page_bypasses_the_store() {
        let tree = Fragment::container(vec![Fragment::markup("per-request")])
            .with_max_age(MaxAge::Uncacheable)
            .with_cache_keys(["front"]);

        let renderer = renderer(BuilderRegistry::new());
        let page = renderer.render(&tree, &ctx("Alice")).await.unwrap();
        assert_eq!(page.cache_status, CacheStatus::Bypass);

        // Still a bypass on the second render; nothing was stored.
        let page = renderer.render(&tree, &ctx("Alice")).await.unwrap();
        assert_eq!(page.cache_status, CacheStatus::Bypass);
    }

    #[tokio::test]
    async fn test_timing_reaches_done() {
        let tree = Fragment::container(vec![Fragment::markup("x")]);
        let page = renderer(BuilderRegistry::new())
            .render(&tree, &ctx("Alice"))
            .await
            .unwrap();
        assert_eq!(page.timing.current_phase(), RenderPhase::Done);
        assert!(page.timing.entered(RenderPhase::Substituting).is_some());
    }
}
