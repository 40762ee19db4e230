//! The fragment tree: static markup, containers, and deferred nodes.

use serde::{Deserialize, Serialize};

use crate::cacheability::{Cacheability, MaxAge};

/// Reference to a registered lazy builder and its arguments.
///
/// Builders are addressed by a stable identifier looked up in a
/// `BuilderRegistry`; the reference itself carries no code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyRef {
    /// Registry identifier of the builder.
    pub builder: String,
    /// Arguments passed to the builder at substitution time.
    pub args: Vec<String>,
}

impl LazyRef {
    /// Create a new builder reference.
    pub fn new(builder: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            builder: builder.into(),
            args,
        }
    }
}

/// Content of a fragment node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentContent {
    /// Literal output.
    Markup(String),
    /// An ordered sequence of child fragments. Order is significant.
    Children(Vec<Fragment>),
    /// Content produced by a lazy builder at final output assembly.
    Deferred(LazyRef),
}

/// A node in the render tree.
///
/// A fragment with deferred content is never evaluated during tree
/// assembly; its builder runs only when the final output is put together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The node's content.
    pub content: FragmentContent,
    /// Declared cacheability of this node.
    pub cacheability: Cacheability,
    /// When non-empty, this fragment's rendered output may be cached
    /// independently of its parent, under a key derived from these.
    pub cache_keys: Vec<String>,
}

impl Fragment {
    /// A literal markup fragment.
    pub fn markup(content: impl Into<String>) -> Self {
        Self {
            content: FragmentContent::Markup(content.into()),
            cacheability: Cacheability::permanent(),
            cache_keys: Vec::new(),
        }
    }

    /// A container of child fragments.
    pub fn container(children: Vec<Fragment>) -> Self {
        Self {
            content: FragmentContent::Children(children),
            cacheability: Cacheability::permanent(),
            cache_keys: Vec::new(),
        }
    }

    /// A fragment whose content comes from a registered lazy builder.
    pub fn deferred(builder: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            content: FragmentContent::Deferred(LazyRef::new(builder, args)),
            cacheability: Cacheability::permanent(),
            cache_keys: Vec::new(),
        }
    }

    /// Append a child, converting markup content into a container if needed.
    pub fn with_child(mut self, child: Fragment) -> Self {
        match &mut self.content {
            FragmentContent::Children(children) => children.push(child),
            _ => {
                let first = std::mem::replace(&mut self.content, FragmentContent::Children(vec![]));
                let mut children = vec![Fragment {
                    content: first,
                    cacheability: Cacheability::permanent(),
                    cache_keys: Vec::new(),
                }];
                children.push(child);
                self.content = FragmentContent::Children(children);
            }
        }
        self
    }

    /// Declare a context kind this fragment varies by.
    pub fn with_context(mut self, kind: impl Into<String>) -> Self {
        self.cacheability.contexts.insert(kind.into());
        self
    }

    /// Declare an invalidation tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.cacheability.tags.insert(tag.into());
        self
    }

    /// Declare a freshness bound.
    pub fn with_max_age(mut self, max_age: MaxAge) -> Self {
        self.cacheability.max_age = max_age;
        self
    }

    /// Declare the cache keys this fragment's output is stored under.
    pub fn with_cache_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this fragment's evaluation is deferred.
    pub fn is_deferred(&self) -> bool {
        matches!(self.content, FragmentContent::Deferred(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_defaults_permanent() {
        let frag = Fragment::markup("Hi");
        assert_eq!(frag.cacheability, Cacheability::permanent());
        assert!(frag.cache_keys.is_empty());
        assert!(!frag.is_deferred());
    }

    #[test]
    fn test_deferred_carries_builder_ref() {
        let frag = Fragment::deferred("greeting", vec!["compact".to_string()]);
        match &frag.content {
            FragmentContent::Deferred(lazy) => {
                assert_eq!(lazy.builder, "greeting");
                assert_eq!(lazy.args, vec!["compact"]);
            }
            other => panic!("expected deferred content, got {:?}", other),
        }
        assert!(frag.is_deferred());
    }

    #[test]
    fn test_with_child_wraps_markup() {
        let frag = Fragment::markup("Hi ").with_child(Fragment::markup("there"));
        match &frag.content {
            FragmentContent::Children(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0].content, FragmentContent::Markup("Hi ".into()));
            }
            other => panic!("expected children, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_style_metadata() {
        let frag = Fragment::deferred("greeting", vec![])
            .with_context("user")
            .with_tag("user:5")
            .with_max_age(MaxAge::Finite(60))
            .with_cache_keys(["greeting"]);

        assert!(frag.cacheability.contexts.contains("user"));
        assert!(frag.cacheability.tags.contains("user:5"));
        assert_eq!(frag.cacheability.max_age, MaxAge::Finite(60));
        assert_eq!(frag.cache_keys, vec!["greeting"]);
    }
}
