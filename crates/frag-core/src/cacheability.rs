//! Cacheability metadata: contexts, tags, and max-age.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Freshness bound for a cached render.
///
/// Variants are ordered from narrowest to widest, so `std::cmp::min`
/// picks the stricter of two bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxAge {
    /// The output must never be cached.
    Uncacheable,
    /// The output may be cached for this many seconds.
    Finite(u64),
    /// The output may be cached indefinitely.
    Permanent,
}

impl MaxAge {
    /// The stricter of two bounds.
    pub fn min(self, other: Self) -> Self {
        std::cmp::min(self, other)
    }

    /// Whether output under this bound may be stored at all.
    ///
    /// A zero-second bound is treated the same as `Uncacheable`.
    pub fn allows_caching(&self) -> bool {
        !matches!(self, Self::Uncacheable | Self::Finite(0))
    }

    /// Remaining seconds, if bounded.
    pub fn as_secs(&self) -> Option<u64> {
        match self {
            Self::Finite(secs) => Some(*secs),
            _ => None,
        }
    }
}

impl Default for MaxAge {
    fn default() -> Self {
        Self::Permanent
    }
}

impl std::fmt::Display for MaxAge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uncacheable => write!(f, "uncacheable"),
            Self::Finite(secs) => write!(f, "{}s", secs),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Describes under what conditions a rendered fragment is valid.
///
/// Merging is commutative, associative, and idempotent: contexts and tags
/// are set unions, max-age is the minimum. The identity element is
/// [`Cacheability::permanent`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cacheability {
    /// Context kinds the output varies by (e.g. "user", "theme").
    pub contexts: BTreeSet<String>,
    /// Invalidation tags; invalidating any tag evicts entries carrying it.
    pub tags: BTreeSet<String>,
    /// Freshness bound.
    #[serde(default)]
    pub max_age: MaxAge,
}

impl Cacheability {
    /// Cacheable forever, varying by nothing. The merge identity.
    pub fn permanent() -> Self {
        Self::default()
    }

    /// Never cacheable.
    pub fn uncacheable() -> Self {
        Self {
            max_age: MaxAge::Uncacheable,
            ..Self::default()
        }
    }

    /// Add a context kind the output varies by.
    pub fn with_context(mut self, kind: impl Into<String>) -> Self {
        self.contexts.insert(kind.into());
        self
    }

    /// Add an invalidation tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the freshness bound.
    pub fn with_max_age(mut self, max_age: MaxAge) -> Self {
        self.max_age = max_age;
        self
    }

    /// Merge another cacheability into this one, monotonically widening.
    pub fn merge(&mut self, other: &Cacheability) {
        self.contexts.extend(other.contexts.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
        self.max_age = self.max_age.min(other.max_age);
    }

    /// Merge, by value.
    pub fn merged(mut self, other: &Cacheability) -> Self {
        self.merge(other);
        self
    }

    /// Whether every requirement here is already covered by `wider`.
    ///
    /// Used to decide if a child fragment is strictly narrower than the
    /// cacheability committed for its container: the child is narrower
    /// exactly when this returns false.
    pub fn is_subsumed_by(&self, wider: &Cacheability) -> bool {
        self.contexts.is_subset(&wider.contexts)
            && self.tags.is_subset(&wider.tags)
            && self.max_age >= wider.max_age
    }

    /// Whether output with this cacheability may be stored.
    pub fn allows_caching(&self) -> bool {
        self.max_age.allows_caching()
    }
}
