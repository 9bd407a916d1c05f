//! The contract between a child collection and the node that owns it.

use crate::{ast::IlNodeRc, Result};

/// Hooks a child collection invokes on its owning node.
///
/// A collection never touches the owner's aggregate state directly. It reports what happened to
/// its elements and leaves recomputation to the owner:
///
/// 1. one [`ChildOwner::attach_child`] per element that entered the collection,
/// 2. one [`ChildOwner::detach_child`] per element that left it,
/// 3. exactly one [`ChildOwner::batch_complete`] at the end of every public mutating call.
///
/// Attach and detach calls are delivered in the order elements are processed, and the commit
/// is always the last call of a batch. Traversal cursors bracket their lifetime with
/// [`ChildOwner::begin_traversal`] and [`ChildOwner::end_traversal`].
pub trait ChildOwner {
    /// Called once per node added to one of the owner's collections.
    ///
    /// Must tolerate nodes that are attached elsewhere at the same time.
    fn attach_child(&self, child: &IlNodeRc);

    /// Called once per node removed from one of the owner's collections.
    fn detach_child(&self, child: &IlNodeRc);

    /// Called exactly once at the end of every mutating call.
    fn batch_complete(&self);

    /// Increments the reentrancy counter for an opened cursor.
    fn begin_traversal(&self);

    /// Decrements the reentrancy counter for a closed cursor.
    fn end_traversal(&self);

    /// Fails if a cursor over any of the owner's collections is open.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDuringTraversal`] when strict checks are compiled in and
    /// the counter is non-zero. Always succeeds otherwise.
    fn assert_no_open_traversal(&self) -> Result<()>;
}
