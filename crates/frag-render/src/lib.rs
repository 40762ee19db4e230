//! Render pipeline for the fragment render cache.
//!
//! This crate provides:
//! - `aggregate` - Bottom-up cacheability merge over a fragment tree
//! - `PlaceholderRegistry` - Token minting and per-render registration of
//!   deferred fragments
//! - `Renderer` - The build / aggregate / cache-decision / substitute
//!   pipeline with lazy builder dispatch
//! - `RenderTiming` - Per-phase timing marks for observability
//!
//! # Example
//!
//! ```ignore
//! use frag_render::Renderer;
//!
//! let renderer = Renderer::new(builders, cache);
//! let page = renderer.render(&tree, &ctx).await?;
//! println!("{} ({})", page.output, page.cache_status);
//! ```

mod aggregate;
mod error;
mod placeholder;
mod renderer;
mod timing;

pub use aggregate::*;
pub use error::*;
pub use placeholder::*;
pub use renderer::*;
pub use timing::*;
