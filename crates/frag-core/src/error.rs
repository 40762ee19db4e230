//! Error types for fragment construction.

use thiserror::Error;

/// A node's content could not be constructed.
///
/// Build failures abort the whole render; there are no retries at this
/// layer.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No builder is registered under the referenced identifier.
    #[error("unknown lazy builder '{0}'")]
    UnknownBuilder(String),

    /// A required context kind could not be resolved.
    #[error("context kind '{0}' could not be resolved")]
    MissingContext(String),

    /// The builder itself failed.
    #[error("builder '{builder}' failed: {source}")]
    Failed {
        /// Registry identifier of the failing builder.
        builder: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
}

impl BuildError {
    /// Wrap an arbitrary error as a builder failure.
    pub fn failed(builder: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Failed {
            builder: builder.into(),
            source: source.into(),
        }
    }
}
