//! Guarded traversal over a child collection.
//!
//! A [`ChildCursor`] walks the live storage of an [`InstructionCollection`], not a snapshot, so
//! an element replaced through [`InstructionCollection::set`] or [`ChildCursor::replace_current`]
//! is seen by the cursor from its position onward. Opening a cursor increments the traversal
//! counter of the owner and dropping it decrements the counter again; while it is non-zero,
//! structural edits on the owner's collections fail with
//! [`crate::Error::InvalidDuringTraversal`].

use std::{fmt, iter::FusedIterator};

use crate::{
    ast::{ChildOwner, IlNodeRc, InstructionCollection, STRICT_CHECKS},
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    NotStarted,
    At(usize),
    Exhausted,
}

/// Iterator over a child collection that blocks structural edits while alive.
///
/// Not `Clone`: every open cursor is exactly one increment of the owner's traversal counter.
///
/// # Examples
///
/// ```rust
/// use dotscope_ilast::ast::{IlNode, IlOpCode};
///
/// let block = IlNode::new(IlOpCode::Block);
/// let instructions = block.collection(0)?;
/// instructions.add_range([IlNode::ldc_i4(1), IlNode::ldc_i4(2)])?;
///
/// let mut cursor = instructions.iter();
/// cursor.next();
/// cursor.replace_current(IlNode::nop())?;
/// drop(cursor);
///
/// assert_eq!(block.to_string(), "block(nop, ldc.i4 2)");
/// # Ok::<(), dotscope_ilast::Error>(())
/// ```
pub struct ChildCursor {
    collection: InstructionCollection,
    state: CursorState,
}

impl ChildCursor {
    pub(crate) fn new(collection: InstructionCollection) -> Self {
        collection.owner().begin_traversal();
        tracing::trace!(
            opcode = %collection.owner().opcode(),
            depth = collection.owner().traversal_depth(),
            "traversal opened"
        );

        ChildCursor {
            collection,
            state: CursorState::NotStarted,
        }
    }

    /// Returns the collection being traversed.
    #[must_use]
    pub fn collection(&self) -> &InstructionCollection {
        &self.collection
    }

    /// Index of the element most recently returned by `next`.
    ///
    /// Named apart from [`Iterator::position`], which a `&mut ChildCursor` would resolve to.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self.state {
            CursorState::At(index) => Some(index),
            _ => None,
        }
    }

    /// Returns the element most recently returned by `next`, as currently stored.
    #[must_use]
    pub fn current(&self) -> Option<IlNodeRc> {
        self.index()
            .and_then(|index| self.collection.get(index).ok())
    }

    /// Returns `true` once the cursor has moved past the last element.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    /// Replaces the current element in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentElement`] before the first call to `next` and after the end was
    /// reached.
    pub fn replace_current(&mut self, node: IlNodeRc) -> Result<()> {
        let index = self.index().ok_or(Error::NoCurrentElement)?;
        self.collection.set(index, node)
    }

    /// Rewinds the cursor to before the first element.
    ///
    /// Always succeeds on a cursor that has not returned an element yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CursorReset`] for a started cursor when strict checks are compiled in.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == CursorState::NotStarted {
            return Ok(());
        }
        if STRICT_CHECKS {
            return Err(Error::CursorReset);
        }

        self.state = CursorState::NotStarted;
        Ok(())
    }
}

impl Iterator for ChildCursor {
    type Item = IlNodeRc;

    fn next(&mut self) -> Option<Self::Item> {
        let index = match self.state {
            CursorState::NotStarted => 0,
            CursorState::At(index) => index + 1,
            CursorState::Exhausted => return None,
        };

        let item = self.collection.items().borrow().get(index).cloned();
        self.state = match item {
            Some(_) => CursorState::At(index),
            None => CursorState::Exhausted,
        };
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.collection.len();
        let remaining = match self.state {
            CursorState::NotStarted => len,
            CursorState::At(index) => len.saturating_sub(index + 1),
            CursorState::Exhausted => 0,
        };
        (remaining, Some(remaining))
    }
}

impl FusedIterator for ChildCursor {}

impl Drop for ChildCursor {
    fn drop(&mut self) {
        let owner = self.collection.owner();
        owner.end_traversal();
        tracing::trace!(
            opcode = %owner.opcode(),
            depth = owner.traversal_depth(),
            "traversal closed"
        );
    }
}

impl fmt::Debug for ChildCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildCursor")
            .field("collection", &self.collection)
            .field("state", &self.state)
            .finish()
    }
}
