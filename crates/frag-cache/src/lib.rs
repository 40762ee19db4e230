//! Render cache store for the fragment render cache.
//!
//! This crate provides:
//! - `CacheKey` / `CacheKeyBuilder` - Schema-versioned key composition
//! - `CachedOutput` / `CacheEntry` - Immutable entries and context redirects
//! - `CacheBackend` - Pluggable storage contract with tag invalidation
//! - `MemoryBackend` - In-process backend for tests and single-node use
//! - `RenderCache` - Front with degrade-on-error reads and a single-flight
//!   guard collapsing concurrent misses into one computation
//!
//! # Example
//!
//! ```ignore
//! use frag_cache::{CacheKeyBuilder, MemoryBackend, RenderCache};
//!
//! let cache = RenderCache::new(MemoryBackend::new());
//! let key = CacheKeyBuilder::new().key("letter-a").build();
//! let (entry, status) = cache
//!     .get_or_compute(&key, || async { /* render the letter */ })
//!     .await?;
//! ```

mod cache;
mod entry;
mod error;
mod key;
mod store;

pub use cache::*;
pub use entry::*;
pub use error::*;
pub use key::*;
pub use store::*;
