//! Parent-chain walks over id-linked trees.
//!
//! Trees are stored as parent references resolved through a lookup, never as
//! in-memory pointer structures. The walk here takes that lookup as a
//! closure so the same code serves blocks and documents, whatever store
//! resolves the links.
//!
//! Walks are bounded by `limit`, the number of nodes that could possibly be
//! on the chain. A longer chain means the stored links already loop.

use crate::TreeError;

/// Check that `node` may be placed under `new_parent`.
///
/// Fails with [`TreeError::Cycle`] when `new_parent` is `node` or one of its
/// descendants. Walks up from `new_parent`, so the cost is the depth of the
/// target, not the size of `node`'s subtree.
pub fn check_reparent<Id, E, F>(node: Id, new_parent: Id, limit: usize, mut parent_of: F) -> Result<(), E>
where
    Id: Copy + Eq,
    E: From<TreeError>,
    F: FnMut(Id) -> Result<Option<Id>, E>,
{
    let mut current = Some(new_parent);
    let mut steps = 0;
    while let Some(id) = current {
        if id == node {
            return Err(TreeError::Cycle.into());
        }
        if steps > limit {
            tracing::warn!(limit, "parent walk exceeded node count");
            return Err(TreeError::DepthExceeded { limit }.into());
        }
        steps += 1;
        current = parent_of(id)?;
    }
    Ok(())
}
