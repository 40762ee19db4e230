//! Core abstractions for the fragment render cache.
//!
//! This crate provides:
//! - `Fragment` - A node of renderable content, static or deferred
//! - `Cacheability` - Contexts, tags, and max-age governing a render
//! - `BuilderRegistry` - Named lazy builders resolved at registration time
//! - `RenderContext` - Explicit, pull-based context resolution
//!
//! # Example
//!
//! ```ignore
//! use frag_core::{Cacheability, Fragment, MaxAge};
//!
//! let page = Fragment::container(vec![
//!     Fragment::markup("This content is the same for everyone."),
//!     Fragment::deferred("greeting", vec![])
//!         .with_context("user")
//!         .with_tag("user:1"),
//! ])
//! .with_cache_keys(["front"]);
//!
//! assert!(page.cacheability.max_age == MaxAge::Permanent);
//! ```

mod builder;
mod cacheability;
mod context;
mod error;
mod fragment;

pub use builder::*;
pub use cacheability::*;
pub use context::*;
pub use error::*;
pub use fragment::*;
