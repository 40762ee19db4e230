//! Cache operation errors.

use thiserror::Error;

/// Errors from the render cache store.
///
/// Callers on the read path treat these as a forced miss; they are never
/// fatal to a render.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Backend storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The collapsed computation behind a single-flight miss failed.
    ///
    /// Every waiter on the key receives the same error.
    #[error("computation failed: {0}")]
    ComputeFailed(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
