//! Bottom-up cacheability aggregation.

use frag_core::{Cacheability, Fragment, FragmentContent};

/// Merge the declared cacheability of a fragment and all its descendants,
/// post-order.
///
/// The result is always at least as wide as the narrowest requirement
/// anywhere in the tree: contexts and tags accumulate by union, and an
/// uncacheable subtree forces an uncacheable result. Deferred nodes
/// contribute their declared metadata like any other node; under-reporting
/// a context here would let varying output be cached under one key.
pub fn aggregate(fragment: &Fragment) -> Cacheability {
    let mut total = fragment.cacheability.clone();
    if let FragmentContent::Children(children) = &fragment.content {
        for child in children {
            total.merge(&aggregate(child));
        }
    }
    total
}
