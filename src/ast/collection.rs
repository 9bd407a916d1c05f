//! Ordered child collections of ILAst nodes.
//!
//! An [`InstructionCollection`] is a handle over one collection slot of an [`IlNode`]. The
//! elements live inside the owner; the handle only knows the owner, the slot and the slot's
//! `base`, the global child index of its first element. Any number of handles over the same slot
//! observe the same sequence.
//!
//! # Position cache
//!
//! Every element caches `(parent, child_index)`. The cache is accurate for this collection iff
//! the parent is the owner, `child_index - base` is in bounds and the element found there is
//! the node itself. Lookups verify this before trusting it and fall back to a linear scan
//! otherwise, because a node can be referenced by a second collection at the same time.
//!
//! Edits that shift elements only rewrite the cache of an element if this collection is still
//! the element's primary location, i.e. the cache pointed at the element's old slot here. An
//! element whose cache points into another collection keeps it.
//!
//! # Notifications
//!
//! All edits report to the owner through [`ChildOwner`]: one attach per inserted element, one
//! detach per removed element, in processing order, then exactly one commit per call.
//!
//! # Traversal guard
//!
//! Structural edits are rejected while a [`ChildCursor`] over any collection of the same owner
//! is open. [`InstructionCollection::set`] is exempt because it never changes the length or
//! shifts another element.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    ast::{ChildCursor, ChildOwner, IlNodeRc, IlNodeRef, SlotDescriptor},
    Error, Result,
};

/// Handle to one ordered child collection of an ILAst node.
///
/// # Examples
///
/// ```rust
/// use dotscope_ilast::ast::{IlNode, IlOpCode};
///
/// let block = IlNode::new(IlOpCode::Block);
/// let instructions = block.collection_named("instructions")?;
///
/// let a = IlNode::ldc_i4(1);
/// let b = IlNode::ldc_i4(2);
/// instructions.add_range([a.clone(), b.clone()])?;
///
/// let c = IlNode::nop();
/// instructions.insert(1, c.clone())?;
/// assert_eq!(instructions.index_of(&b), Some(2));
/// assert_eq!(b.child_index(), 2);
///
/// let removed = instructions.remove_all(|node| node.operand().to_string() == "1")?;
/// assert_eq!(removed, 1);
/// assert_eq!(instructions.to_vec().len(), 2);
/// # Ok::<(), dotscope_ilast::Error>(())
/// ```
#[derive(Clone)]
pub struct InstructionCollection {
    owner: IlNodeRc,
    slot: usize,
    base: usize,
}

impl InstructionCollection {
    /// Creates a handle over a collection slot of a node that is referenced weakly.
    ///
    /// # Arguments
    ///
    /// * `owner` - Weak reference to the owning node
    /// * `slot` - The slot index inside the owner's layout
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingOwner`] if the owner has been dropped, and the errors of
    /// [`crate::ast::IlNode::collection`] for invalid slots.
    pub fn new(owner: &IlNodeRef, slot: usize) -> Result<Self> {
        let owner = owner.upgrade().ok_or(Error::MissingOwner)?;
        Self::for_slot(owner, slot)
    }

    pub(crate) fn for_slot(owner: IlNodeRc, slot: usize) -> Result<Self> {
        let descriptor = owner.descriptor(slot)?;
        if !descriptor.is_collection() {
            return Err(Error::NotACollection {
                opcode: owner.opcode(),
                slot: descriptor.name,
            });
        }

        // only the trailing slot may be a collection, every slot before it holds one operand
        Ok(InstructionCollection {
            owner,
            slot,
            base: slot,
        })
    }

    /// Returns the owning node.
    #[must_use]
    pub fn owner(&self) -> &IlNodeRc {
        &self.owner
    }

    /// Returns the slot index inside the owner's layout.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Returns the global child index of the first element.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Returns the slot descriptor of this collection.
    #[must_use]
    pub fn descriptor(&self) -> &'static SlotDescriptor {
        &self.owner.opcode().slots()[self.slot]
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items().borrow().len()
    }

    /// Returns `true` if the collection has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items().borrow().is_empty()
    }

    /// Returns the first element.
    #[must_use]
    pub fn first(&self) -> Option<IlNodeRc> {
        self.items().borrow().first().cloned()
    }

    /// Returns the last element.
    #[must_use]
    pub fn last(&self) -> Option<IlNodeRc> {
        self.items().borrow().last().cloned()
    }

    /// Returns a snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<IlNodeRc> {
        self.items().borrow().clone()
    }

    /// Returns the index of `node` inside this collection.
    ///
    /// O(1) if the cached position of `node` is accurate for this collection, O(n) otherwise.
    #[must_use]
    pub fn index_of(&self, node: &IlNodeRc) -> Option<usize> {
        let items = self.items().borrow();

        if node.parent_is(&self.owner) {
            if let Some(index) = node.child_index().checked_sub(self.base) {
                if items.get(index).is_some_and(|item| Rc::ptr_eq(item, node)) {
                    return Some(index);
                }
            }
        }

        items.iter().position(|item| Rc::ptr_eq(item, node))
    }

    /// Returns `true` if `node` is an element of this collection.
    ///
    /// This is O(n) in the worst case. When a node is known not to be aliased, comparing
    /// [`crate::ast::IlNode::parent`] and [`crate::ast::IlNode::child_index`] answers the same
    /// question in O(1).
    #[must_use]
    pub fn contains(&self, node: &IlNodeRc) -> bool {
        self.index_of(node).is_some()
    }

    /// Returns the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if `index >= len`.
    pub fn get(&self, index: usize) -> Result<IlNodeRc> {
        let items = self.items().borrow();
        items.get(index).cloned().ok_or(Error::OutOfBounds {
            index,
            len: items.len(),
        })
    }

    /// Replaces the element at `index` with `node`.
    ///
    /// Replacing an element with itself does nothing. Otherwise `node` is attached, the old
    /// element detached and one commit is emitted. This is allowed while a cursor is open, and
    /// the cursor observes the new element from its current position onward.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if `index >= len`.
    pub fn set(&self, index: usize, node: IlNodeRc) -> Result<()> {
        let old = {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            let Some(current) = items.get_mut(index) else {
                return Err(Error::OutOfBounds { index, len });
            };
            if Rc::ptr_eq(current, &node) {
                return Ok(());
            }

            node.set_child_index(index + self.base);
            std::mem::replace(current, Rc::clone(&node))
        };

        self.owner.attach_child(&node);
        self.owner.detach_child(&old);
        self.owner.batch_complete();
        Ok(())
    }

    /// Appends `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner.
    pub fn add(&self, node: IlNodeRc) -> Result<()> {
        self.owner.assert_no_open_traversal()?;

        {
            let mut items = self.items().borrow_mut();
            node.set_child_index(items.len() + self.base);
            items.push(Rc::clone(&node));
        }

        self.owner.attach_child(&node);
        self.owner.batch_complete();
        Ok(())
    }

    /// Appends all `nodes` in iteration order with a single commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner.
    pub fn add_range<I>(&self, nodes: I) -> Result<()>
    where
        I: IntoIterator<Item = IlNodeRc>,
    {
        self.owner.assert_no_open_traversal()?;
        let nodes: Vec<IlNodeRc> = nodes.into_iter().collect();

        {
            let mut items = self.items().borrow_mut();
            items.reserve(nodes.len());
            for node in nodes {
                node.set_child_index(items.len() + self.base);
                items.push(Rc::clone(&node));
                self.owner.attach_child(&node);
            }
        }

        self.owner.batch_complete();
        Ok(())
    }

    /// Inserts `node` at `index`, shifting all later elements to the right.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner and
    /// [`Error::OutOfBounds`] if `index > len`.
    pub fn insert(&self, index: usize, node: IlNodeRc) -> Result<()> {
        self.owner.assert_no_open_traversal()?;

        {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            if index > len {
                return Err(Error::OutOfBounds { index, len });
            }

            node.set_child_index(index + self.base);
            items.insert(index, Rc::clone(&node));

            for (i, item) in items.iter().enumerate().skip(index + 1) {
                if item.is_primary_at(&self.owner, i - 1 + self.base) {
                    item.set_child_index(i + self.base);
                }
            }
        }

        self.owner.attach_child(&node);
        self.owner.batch_complete();
        Ok(())
    }

    /// Removes and returns the element at `index`, shifting all later elements to the left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner and
    /// [`Error::OutOfBounds`] if `index >= len`.
    pub fn remove_at(&self, index: usize) -> Result<IlNodeRc> {
        self.owner.assert_no_open_traversal()?;

        let removed = {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            if index >= len {
                return Err(Error::OutOfBounds { index, len });
            }

            let removed = items.remove(index);
            self.owner.detach_child(&removed);

            for (i, item) in items.iter().enumerate().skip(index) {
                if item.is_primary_at(&self.owner, i + 1 + self.base) {
                    item.set_child_index(i + self.base);
                }
            }
            removed
        };

        self.owner.batch_complete();
        Ok(removed)
    }

    /// Removes `node` if it is an element of this collection.
    ///
    /// Returns `true` if an element was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner.
    pub fn remove(&self, node: &IlNodeRc) -> Result<bool> {
        self.owner.assert_no_open_traversal()?;

        match self.index_of(node) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Removes `count` elements starting at `index` with a single commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner and
    /// [`Error::OutOfBounds`] if the range does not fit into the collection. The error carries
    /// `index` if the start is already past the end, and the exclusive end `index + count`
    /// otherwise.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<()> {
        self.owner.assert_no_open_traversal()?;

        {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            if index > len {
                return Err(Error::OutOfBounds { index, len });
            }
            let end = match index.checked_add(count) {
                Some(end) if end <= len => end,
                _ => {
                    return Err(Error::OutOfBounds {
                        index: index.saturating_add(count),
                        len,
                    })
                }
            };

            for removed in items.drain(index..end) {
                self.owner.detach_child(&removed);
            }

            for (i, item) in items.iter().enumerate().skip(index) {
                if item.is_primary_at(&self.owner, i + count + self.base) {
                    item.set_child_index(i + self.base);
                }
            }
        }

        self.owner.batch_complete();
        Ok(())
    }

    /// Removes the element at `index` in O(1) by moving the last element into its place.
    ///
    /// Does not preserve the order of the remaining elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner and
    /// [`Error::OutOfBounds`] if `index >= len`.
    pub fn swap_remove_at(&self, index: usize) -> Result<IlNodeRc> {
        self.owner.assert_no_open_traversal()?;

        let removed = {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            if index >= len {
                return Err(Error::OutOfBounds { index, len });
            }

            let removed = items.swap_remove(index);
            self.owner.detach_child(&removed);

            if let Some(moved) = items.get(index) {
                if moved.is_primary_at(&self.owner, len - 1 + self.base) {
                    moved.set_child_index(index + self.base);
                }
            }
            removed
        };

        self.owner.batch_complete();
        Ok(removed)
    }

    /// Moves the element at `old_index` to `new_index`, shifting the elements in between.
    ///
    /// The element stays in the collection, so no attach or detach is reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner and
    /// [`Error::OutOfBounds`] if either index is `>= len`.
    pub fn move_element_to_index(&self, old_index: usize, new_index: usize) -> Result<()> {
        self.owner.assert_no_open_traversal()?;

        {
            let mut items = self.items().borrow_mut();
            let len = items.len();
            for index in [old_index, new_index] {
                if index >= len {
                    return Err(Error::OutOfBounds { index, len });
                }
            }

            let (low, high) = (old_index.min(new_index), old_index.max(new_index));
            if old_index < new_index {
                items[low..=high].rotate_left(1);
            } else {
                items[low..=high].rotate_right(1);
            }

            for i in low..=high {
                let previous = if i == new_index {
                    old_index
                } else if old_index < new_index {
                    i + 1
                } else {
                    i - 1
                };

                let item = &items[i];
                if item.is_primary_at(&self.owner, previous + self.base) {
                    item.set_child_index(i + self.base);
                }
            }
        }

        self.owner.batch_complete();
        Ok(())
    }

    /// Moves `node` to the end of the collection.
    ///
    /// Returns `false` if `node` is not an element of this collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner.
    pub fn move_element_to_end(&self, node: &IlNodeRc) -> Result<bool> {
        self.owner.assert_no_open_traversal()?;

        match self.index_of(node) {
            Some(index) => {
                let last = self.len() - 1;
                self.move_element_to_index(index, last).map(|()| true)
            }
            None => Ok(false),
        }
    }

    /// Removes all elements with a single commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner.
    pub fn clear(&self) -> Result<()> {
        self.owner.assert_no_open_traversal()?;

        let removed = std::mem::take(&mut *self.items().borrow_mut());
        for node in &removed {
            self.owner.detach_child(node);
        }

        self.owner.batch_complete();
        Ok(())
    }

    /// Replaces the whole content with `nodes`.
    ///
    /// Overwrites elements position by position, appends the surplus of `nodes` and truncates
    /// the surplus of the old content. Has the same observable result as [`clear`] followed by
    /// [`add_range`] but never leaves the collection empty in between and emits one commit.
    ///
    /// [`clear`]: InstructionCollection::clear
    /// [`add_range`]: InstructionCollection::add_range
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner.
    pub fn replace_list<I>(&self, nodes: I) -> Result<()>
    where
        I: IntoIterator<Item = IlNodeRc>,
    {
        self.owner.assert_no_open_traversal()?;
        let nodes: Vec<IlNodeRc> = nodes.into_iter().collect();

        {
            let mut items = self.items().borrow_mut();
            let mut index = 0;

            for node in nodes {
                node.set_child_index(index + self.base);
                if index < items.len() {
                    let old = std::mem::replace(&mut items[index], Rc::clone(&node));
                    self.owner.attach_child(&node);
                    self.owner.detach_child(&old);
                } else {
                    items.push(Rc::clone(&node));
                    self.owner.attach_child(&node);
                }
                index += 1;
            }

            for old in items.drain(index..) {
                self.owner.detach_child(&old);
            }
        }

        self.owner.batch_complete();
        Ok(())
    }

    /// Removes every element for which `predicate` returns `true`, in one forward pass.
    ///
    /// Returns the number of removed elements. This is O(n), where calling
    /// [`InstructionCollection::remove_at`] in a loop would be O(n²) and shift positions under
    /// the loop. A commit is only emitted if at least one element was removed.
    ///
    /// The pass counts as a traversal of the owner, so structural edits from inside the
    /// predicate fail with [`Error::InvalidDuringTraversal`] when strict checks are compiled in.
    /// The collection keeps its length until the pass ends. If the predicate panics, the
    /// elements it already rejected are still removed and committed before unwinding continues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuringTraversal`] if a cursor is open on the owner.
    pub fn remove_all<F>(&self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&IlNodeRc) -> bool,
    {
        self.owner.assert_no_open_traversal()?;

        let len = self.len();
        let mut pass = Compaction::begin(self);

        while pass.processed < len {
            let i = pass.processed;
            let item = self.items().borrow().get(i).cloned();
            let Some(item) = item else {
                break;
            };

            if predicate(&item) {
                self.owner.detach_child(&item);
                pass.removed += 1;
            } else {
                if item.is_primary_at(&self.owner, i + self.base) {
                    item.set_child_index(pass.kept + self.base);
                }
                self.items().borrow_mut().swap(pass.kept, i);
                pass.kept += 1;
            }
            pass.processed += 1;
        }

        Ok(pass.finish())
    }

    /// Opens a guarded traversal cursor over this collection.
    ///
    /// While the cursor is alive all structural edits on collections of the same owner fail.
    #[must_use]
    pub fn iter(&self) -> ChildCursor {
        ChildCursor::new(self.clone())
    }

    pub(crate) fn items(&self) -> &RefCell<Vec<IlNodeRc>> {
        self.owner.storage(self.slot)
    }
}

/// In-place compaction state of [`InstructionCollection::remove_all`].
///
/// Elements in `[0, kept)` survive, elements in `[kept, processed)` were detached and are
/// drained on drop, so the storage is consistent even if the predicate unwinds.
struct Compaction<'a> {
    collection: &'a InstructionCollection,
    kept: usize,
    processed: usize,
    removed: usize,
}

impl<'a> Compaction<'a> {
    fn begin(collection: &'a InstructionCollection) -> Self {
        collection.owner.begin_traversal();
        Compaction {
            collection,
            kept: 0,
            processed: 0,
            removed: 0,
        }
    }

    fn finish(self) -> usize {
        self.removed
    }
}

impl Drop for Compaction<'_> {
    fn drop(&mut self) {
        let owner = &self.collection.owner;
        let base = self.collection.base;

        {
            let mut items = self.collection.items().borrow_mut();
            let end = self.processed.min(items.len());
            let start = self.kept.min(end);
            items.drain(start..end);

            let shift = end - start;
            if shift > 0 {
                for (i, item) in items.iter().enumerate().skip(start) {
                    if item.is_primary_at(owner, i + shift + base) {
                        item.set_child_index(i + base);
                    }
                }
            }
        }

        owner.end_traversal();
        if self.removed > 0 {
            owner.batch_complete();
        }
    }
}

impl IntoIterator for &InstructionCollection {
    type Item = IlNodeRc;
    type IntoIter = ChildCursor;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for InstructionCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionCollection")
            .field("owner", &self.owner.opcode())
            .field("slot", &self.descriptor().name)
            .field("base", &self.base)
            .field("len", &self.len())
            .finish()
    }
}
