//! Render pipeline errors.

use std::time::Duration;

use frag_core::BuildError;
use thiserror::Error;

/// A render aborted. Carries the identity of the failing node.
///
/// Cache-layer failures never surface here; they degrade to rendering
/// without caching. Nothing in this pipeline is retried.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A node's content could not be constructed.
    #[error("failed to build node '{node}': {source}")]
    Build {
        /// Builder identifier of the failing node.
        node: String,
        /// Underlying build failure.
        #[source]
        source: BuildError,
    },

    /// The tree root itself was deferred; a placeholder is never created
    /// for the root.
    #[error("the tree root cannot be a deferred fragment")]
    DeferredRoot,

    /// Recursive substitution exceeded the maximum depth, indicating
    /// cyclic builder references. A configuration bug, not retryable.
    #[error("placeholder substitution exceeded depth {depth} at token {token}")]
    PlaceholderCycle {
        /// A token still unresolved when the bound was hit.
        token: String,
        /// The configured maximum depth.
        depth: usize,
    },

    /// A builder exceeded its time bound. Fatal for this render only.
    #[error("builder '{builder}' exceeded its time bound of {timeout:?}")]
    Timeout {
        /// Builder identifier.
        builder: String,
        /// The configured bound.
        timeout: Duration,
    },
}

impl RenderError {
    /// Wrap a build failure with the failing node's identity.
    pub fn build(node: impl Into<String>, source: BuildError) -> Self {
        Self::Build {
            node: node.into(),
            source,
        }
    }
}
