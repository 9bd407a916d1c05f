//! ILAst instruction nodes.
//!
//! An [`IlNode`] is one reconstructed instruction. It owns its children through a fixed set of
//! slots (see [`crate::ast::SlotDescriptor`]) and keeps a weak back-reference to the node that
//! most recently attached it, together with its global child index inside that node. This pair is
//! a cache: transformation passes may hold a node in two places for a short while, so every user
//! of the cache verifies it before trusting it and falls back to a scan otherwise.
//!
//! Nodes are shared through [`IlNodeRc`] and compared by reference identity. All bookkeeping
//! fields use interior mutability, which keeps the tree editable through shared handles while a
//! read-only pass is iterating it. The guard against structural edits during such an iteration is
//! the traversal counter maintained through [`crate::ast::ChildOwner`].

use std::{
    cell::{Cell, RefCell},
    fmt, iter,
    rc::{Rc, Weak},
};

use crate::{
    ast::{
        ChildOwner, IlOpCode, IlOperand, InstructionCollection, InstructionFlags, SlotArity,
        SlotDescriptor, STRICT_CHECKS,
    },
    Error, Result,
};

/// A reference counted ILAst node
pub type IlNodeRc = Rc<IlNode>;

/// A smart reference to an `IlNode` that does not keep it alive
#[derive(Clone, Debug)]
pub struct IlNodeRef {
    weak_ref: Weak<IlNode>,
}

impl IlNodeRef {
    /// Create a new `IlNodeRef` from a strong reference
    pub fn new(strong_ref: &IlNodeRc) -> Self {
        Self {
            weak_ref: Rc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the node, returning None if the node has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<IlNodeRc> {
        self.weak_ref.upgrade()
    }

    /// Check if the referenced node is still alive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak_ref.strong_count() > 0
    }

    /// Get the opcode of the referenced node (if still alive)
    #[must_use]
    pub fn opcode(&self) -> Option<IlOpCode> {
        self.upgrade().map(|node| node.opcode)
    }
}

impl From<IlNodeRc> for IlNodeRef {
    fn from(strong_ref: IlNodeRc) -> Self {
        Self::new(&strong_ref)
    }
}

/// A node of the ILAst decompiler tree.
///
/// # Examples
///
/// ```rust
/// use dotscope_ilast::ast::{IlNode, IlOpCode, IlOperand};
///
/// let sum = IlNode::from_children(
///     IlOpCode::Add,
///     IlOperand::None,
///     [IlNode::ldc_i4(1), IlNode::ldloc(0)],
/// )?;
/// assert_eq!(sum.to_string(), "add(ldc.i4 1, ldloc V_0)");
///
/// let right = sum.child(1).unwrap();
/// assert!(std::rc::Rc::ptr_eq(&right.parent().unwrap(), &sum));
/// assert_eq!(right.child_index(), 1);
/// # Ok::<(), dotscope_ilast::Error>(())
/// ```
pub struct IlNode {
    opcode: IlOpCode,
    operand: Cell<IlOperand>,
    /// Weak handle to this node, handed to children as their back-reference
    self_ref: Weak<IlNode>,
    /// Node that most recently attached this node
    parent: RefCell<Weak<IlNode>>,
    /// Global child index inside `parent`, only meaningful while `parent` is set
    child_index: Cell<usize>,
    /// Number of child slots currently referencing this node
    slot_refs: Cell<usize>,
    /// Open cursors over the collections of this node
    traversal_depth: Cell<u32>,
    slots: Box<[RefCell<Vec<IlNodeRc>>]>,
    /// Aggregate flags of the subtree, `None` when invalidated
    flags: Cell<Option<InstructionFlags>>,
    /// Number of completed child batches
    version: Cell<u64>,
    #[cfg(test)]
    events: RefCell<Vec<OwnerEvent>>,
}

/// Owner notification as received by a node, recorded for ordering assertions.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OwnerEvent {
    Attach(IlOperand),
    Detach(IlOperand),
    Commit,
}

impl IlNode {
    /// Creates a new node without operand and with empty slots.
    #[must_use]
    pub fn new(opcode: IlOpCode) -> IlNodeRc {
        Self::with_operand(opcode, IlOperand::None)
    }

    /// Creates a new node with an immediate operand and empty slots.
    #[must_use]
    pub fn with_operand(opcode: IlOpCode, operand: IlOperand) -> IlNodeRc {
        Rc::new_cyclic(|self_ref| IlNode {
            opcode,
            operand: Cell::new(operand),
            self_ref: self_ref.clone(),
            parent: RefCell::new(Weak::new()),
            child_index: Cell::new(0),
            slot_refs: Cell::new(0),
            traversal_depth: Cell::new(0),
            slots: opcode
                .slots()
                .iter()
                .map(|_| RefCell::new(Vec::new()))
                .collect(),
            flags: Cell::new(None),
            version: Cell::new(0),
            #[cfg(test)]
            events: RefCell::new(Vec::new()),
        })
    }

    /// Creates a node and fills its slots in global child-index order.
    ///
    /// Single operand slots take one child each, a trailing collection takes all remaining
    /// children.
    ///
    /// # Arguments
    ///
    /// * `opcode` - The instruction kind
    /// * `operand` - The immediate operand
    /// * `children` - The children, in global child-index order
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyChildren`] if the layout can not hold all children.
    pub fn from_children<I>(opcode: IlOpCode, operand: IlOperand, children: I) -> Result<IlNodeRc>
    where
        I: IntoIterator<Item = IlNodeRc>,
    {
        let node = Self::with_operand(opcode, operand);
        let mut children = children.into_iter();

        for (slot, descriptor) in opcode.slots().iter().enumerate() {
            match descriptor.arity {
                SlotArity::One => match children.next() {
                    Some(child) => node.set_slot_child(slot, Some(child))?,
                    None => break,
                },
                SlotArity::Many => {
                    node.collection(slot)?.add_range(children.by_ref())?;
                }
            }
        }

        if children.next().is_some() {
            return Err(Error::TooManyChildren {
                opcode,
                max: opcode.slots().len(),
            });
        }

        Ok(node)
    }

    /// Creates an `ldc.i4` node.
    #[must_use]
    pub fn ldc_i4(value: i32) -> IlNodeRc {
        Self::with_operand(IlOpCode::LdcI4, IlOperand::I4(value))
    }

    /// Creates an `ldloc` node.
    #[must_use]
    pub fn ldloc(local: u16) -> IlNodeRc {
        Self::with_operand(IlOpCode::LdLoc, IlOperand::Local(local))
    }

    /// Creates a `nop` node.
    #[must_use]
    pub fn nop() -> IlNodeRc {
        Self::new(IlOpCode::Nop)
    }

    /// Returns the opcode.
    #[must_use]
    pub fn opcode(&self) -> IlOpCode {
        self.opcode
    }

    /// Returns the immediate operand.
    #[must_use]
    pub fn operand(&self) -> IlOperand {
        self.operand.get()
    }

    /// Replaces the immediate operand.
    pub fn set_operand(&self, operand: IlOperand) {
        self.operand.set(operand);
    }

    /// Returns the number of slots of this node.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the descriptor of `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSlot`] if the opcode has no such slot.
    pub fn descriptor(&self, slot: usize) -> Result<&'static SlotDescriptor> {
        self.opcode.slot(slot).ok_or(Error::UnknownSlot {
            opcode: self.opcode,
            slot,
        })
    }

    /// Returns the child collection stored in `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSlot`] for slots outside of the layout and
    /// [`Error::NotACollection`] for single operand slots.
    pub fn collection(self: &Rc<Self>, slot: usize) -> Result<InstructionCollection> {
        InstructionCollection::for_slot(Rc::clone(self), slot)
    }

    /// Returns the child collection stored in the slot called `name`.
    ///
    /// # Errors
    ///
    /// Same as [`IlNode::collection`]; an unknown name is reported as the first slot index past
    /// the layout.
    pub fn collection_named(self: &Rc<Self>, name: &str) -> Result<InstructionCollection> {
        let slot = self.opcode.slot_index(name).unwrap_or(self.slots.len());
        self.collection(slot)
    }

    /// Returns the child stored in a single operand slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSlot`] or [`Error::NotAnOperand`] if `slot` is not a single
    /// operand slot.
    pub fn slot_child(&self, slot: usize) -> Result<Option<IlNodeRc>> {
        let storage = self.operand_storage(slot)?;
        let child = storage.borrow().first().cloned();
        Ok(child)
    }

    /// Assigns the child of a single operand slot.
    ///
    /// Like in-place replacement in a collection this never shifts another child, so it is
    /// allowed while a traversal is open. Assigning the current child again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSlot`] or [`Error::NotAnOperand`] if `slot` is not a single
    /// operand slot.
    pub fn set_slot_child(&self, slot: usize, child: Option<IlNodeRc>) -> Result<()> {
        let storage = self.operand_storage(slot)?;

        let old = {
            let mut items = storage.borrow_mut();
            match (items.first(), child.as_ref()) {
                (Some(current), Some(new)) if Rc::ptr_eq(current, new) => return Ok(()),
                (None, None) => return Ok(()),
                _ => {}
            }

            let old = items.pop();
            if let Some(new) = &child {
                new.child_index.set(slot);
                items.push(Rc::clone(new));
            }
            old
        };

        if let Some(new) = &child {
            self.attach_child(new);
        }
        if let Some(old) = &old {
            self.detach_child(old);
        }
        self.batch_complete();
        Ok(())
    }

    /// Returns the size of the global child-index space.
    ///
    /// Every single operand slot reserves one index, even while it is empty, and a trailing
    /// collection contributes its length.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.opcode
            .slots()
            .iter()
            .zip(self.slots.iter())
            .map(|(descriptor, storage)| match descriptor.arity {
                SlotArity::One => 1,
                SlotArity::Many => storage.borrow().len(),
            })
            .sum()
    }

    /// Returns the child at a global child index, `None` if out of range or an empty operand.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<IlNodeRc> {
        let (slot, local) = self.locate(index)?;
        self.slots[slot].borrow().get(local).cloned()
    }

    /// Returns a snapshot of all children in global child-index order.
    ///
    /// Empty operand slots are skipped.
    #[must_use]
    pub fn children(&self) -> Vec<IlNodeRc> {
        self.slots
            .iter()
            .flat_map(|storage| storage.borrow().clone())
            .collect()
    }

    /// Replaces the child at a global child index.
    ///
    /// Dispatches to [`IlNode::set_slot_child`] or [`InstructionCollection::set`] depending on
    /// the slot the index falls into.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the index is outside the global child-index space.
    pub fn set_child(self: &Rc<Self>, index: usize, child: IlNodeRc) -> Result<()> {
        let len = self.child_count();
        let located = if index < len { self.locate(index) } else { None };
        let Some((slot, local)) = located else {
            return Err(Error::OutOfBounds { index, len });
        };

        if self.descriptor(slot)?.is_collection() {
            self.collection(slot)?.set(local, child)
        } else {
            self.set_slot_child(slot, Some(child))
        }
    }

    /// Finds the global child index of `child` inside this node.
    ///
    /// Uses the cached position of `child` if it is accurate for this node, and scans all slots
    /// otherwise.
    #[must_use]
    pub fn find_child(&self, child: &IlNodeRc) -> Option<usize> {
        let cached = child.child_index.get();
        if child.parent_is(self) {
            if let Some(current) = self.child(cached) {
                if Rc::ptr_eq(&current, child) {
                    return Some(cached);
                }
            }
        }

        self.opcode
            .slots()
            .iter()
            .enumerate()
            .find_map(|(slot, _)| {
                self.slots[slot]
                    .borrow()
                    .iter()
                    .position(|item| Rc::ptr_eq(item, child))
                    .map(|local| slot + local)
            })
    }

    /// Returns the node that most recently attached this node, if it is still alive.
    ///
    /// With multiple parents this only reflects the latest attach.
    #[must_use]
    pub fn parent(&self) -> Option<IlNodeRc> {
        self.parent.borrow().upgrade()
    }

    /// Returns the cached global child index inside [`IlNode::parent`].
    ///
    /// O(1), but only trustworthy when the node is not aliased in another collection.
    #[must_use]
    pub fn child_index(&self) -> usize {
        self.child_index.get()
    }

    /// Returns the number of child slots currently referencing this node.
    #[must_use]
    pub fn slot_refs(&self) -> usize {
        self.slot_refs.get()
    }

    /// Returns `true` if at least one child slot references this node.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slot_refs.get() > 0
    }

    /// Iterates over the parent chain, starting with the direct parent.
    pub fn ancestors(&self) -> impl Iterator<Item = IlNodeRc> {
        iter::successors(self.parent(), |node| node.parent())
    }

    /// Returns `true` if `possible_ancestor` is this node or one of its ancestors.
    #[must_use]
    pub fn is_descendant_of(&self, possible_ancestor: &IlNode) -> bool {
        std::ptr::eq(self, possible_ancestor)
            || self
                .ancestors()
                .any(|node| std::ptr::eq(Rc::as_ptr(&node), possible_ancestor))
    }

    /// Replaces this node inside its parent with `replacement`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] if the node has no live parent or the parent no longer holds
    /// it.
    pub fn replace_with(self: &Rc<Self>, replacement: IlNodeRc) -> Result<()> {
        let parent = self.parent().ok_or(Error::Detached)?;
        let index = parent.find_child(self).ok_or(Error::Detached)?;
        parent.set_child(index, replacement)
    }

    /// Removes this node from its parent.
    ///
    /// Operand slots are emptied, collections lose the element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detached`] if the node has no live parent or the parent no longer holds
    /// it, and [`Error::InvalidDuringTraversal`] when removing from a collection that is being
    /// traversed.
    pub fn remove_from_parent(self: &Rc<Self>) -> Result<()> {
        let parent = self.parent().ok_or(Error::Detached)?;
        let index = parent.find_child(self).ok_or(Error::Detached)?;
        let (slot, local) = parent.locate(index).ok_or(Error::Detached)?;

        if parent.descriptor(slot)?.is_collection() {
            parent.collection(slot)?.remove_at(local).map(|_| ())
        } else {
            parent.set_slot_child(slot, None)
        }
    }

    /// Returns the flags of this instruction and its subtree.
    ///
    /// The result is cached until the next commit notification on this node or one of its
    /// descendants.
    ///
    /// Invalidation walks the [`IlNode::parent`] chain only. If a node is held by two owners,
    /// a change inside its subtree refreshes the owner that attached it last, and the other
    /// owner keeps its cached flags until one of its own collections commits.
    #[must_use]
    pub fn flags(&self) -> InstructionFlags {
        if let Some(flags) = self.flags.get() {
            return flags;
        }

        let mut flags = self.opcode.direct_flags();
        for child in self.children() {
            flags |= child.flags().propagated();
        }

        if self.opcode == IlOpCode::Block {
            let tail = self.slots[0].borrow().last().cloned();
            if let Some(last) = tail {
                flags |= last.flags() & InstructionFlags::END_POINT_UNREACHABLE;
            }
        }

        self.flags.set(Some(flags));
        flags
    }

    /// Returns the flags of this instruction without its children.
    #[must_use]
    pub fn direct_flags(&self) -> InstructionFlags {
        self.opcode.direct_flags()
    }

    /// Returns the number of completed child batches.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Returns the number of open cursors over the collections of this node.
    #[must_use]
    pub fn traversal_depth(&self) -> u32 {
        self.traversal_depth.get()
    }

    /// Drains the notifications this node received so far.
    #[cfg(test)]
    pub(crate) fn take_events(&self) -> Vec<OwnerEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    #[cfg(test)]
    fn record(&self, event: OwnerEvent) {
        self.events.borrow_mut().push(event);
    }

    /// Storage of `slot`; callers validate the slot against the layout first.
    pub(crate) fn storage(&self, slot: usize) -> &RefCell<Vec<IlNodeRc>> {
        &self.slots[slot]
    }

    pub(crate) fn set_child_index(&self, index: usize) {
        self.child_index.set(index);
    }

    /// Returns `true` if `owner` is this node's primary location at `index`.
    pub(crate) fn is_primary_at(&self, owner: &IlNode, index: usize) -> bool {
        self.child_index.get() == index && self.parent_is(owner)
    }

    pub(crate) fn parent_is(&self, owner: &IlNode) -> bool {
        Weak::ptr_eq(&self.parent.borrow(), &owner.self_ref)
    }

    fn operand_storage(&self, slot: usize) -> Result<&RefCell<Vec<IlNodeRc>>> {
        let descriptor = self.descriptor(slot)?;
        if descriptor.is_collection() {
            return Err(Error::NotAnOperand {
                opcode: self.opcode,
                slot: descriptor.name,
            });
        }
        Ok(&self.slots[slot])
    }

    /// Maps a global child index to `(slot, index inside slot)`.
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let last = self.slots.len().checked_sub(1)?;
        let slot = index.min(last);
        let local = index - slot;

        if local > 0 && !self.opcode.slots()[slot].is_collection() {
            return None;
        }
        Some((slot, local))
    }

    fn invalidate_flags(&self) {
        self.flags.set(None);

        let mut next = self.parent();
        while let Some(node) = next {
            if node.flags.get().is_none() {
                break;
            }
            node.flags.set(None);
            next = node.parent();
        }
    }
}

impl ChildOwner for IlNode {
    fn attach_child(&self, child: &IlNodeRc) {
        debug_assert!(
            !self.is_descendant_of(child),
            "ILAst must form a tree, '{}' can not become a child of its own subtree",
            child.opcode
        );

        *child.parent.borrow_mut() = self.self_ref.clone();
        child.slot_refs.set(child.slot_refs.get() + 1);

        #[cfg(test)]
        self.record(OwnerEvent::Attach(child.operand()));
    }

    fn detach_child(&self, child: &IlNodeRc) {
        let refs = child.slot_refs.get().saturating_sub(1);
        child.slot_refs.set(refs);

        if refs == 0 && child.parent_is(self) {
            *child.parent.borrow_mut() = Weak::new();
        }

        #[cfg(test)]
        self.record(OwnerEvent::Detach(child.operand()));
    }

    fn batch_complete(&self) {
        let version = self.version.get() + 1;
        self.version.set(version);
        self.invalidate_flags();

        #[cfg(test)]
        self.record(OwnerEvent::Commit);

        tracing::trace!(opcode = %self.opcode, version, "child batch complete");
    }

    fn begin_traversal(&self) {
        self.traversal_depth.set(self.traversal_depth.get() + 1);
    }

    fn end_traversal(&self) {
        let depth = self.traversal_depth.get();
        debug_assert!(depth > 0, "unbalanced end_traversal on '{}'", self.opcode);
        self.traversal_depth.set(depth.saturating_sub(1));
    }

    fn assert_no_open_traversal(&self) -> Result<()> {
        let depth = self.traversal_depth.get();
        if STRICT_CHECKS && depth > 0 {
            tracing::debug!(opcode = %self.opcode, depth, "structural edit during traversal");
            return Err(Error::InvalidDuringTraversal {
                opcode: self.opcode,
                depth,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for IlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IlNode")
            .field("opcode", &self.opcode)
            .field("operand", &self.operand.get())
            .field("child_index", &self.child_index.get())
            .field("slot_refs", &self.slot_refs.get())
            .field("children", &self.children().len())
            .finish()
    }
}

impl fmt::Display for IlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;

        let operand = self.operand.get();
        if operand != IlOperand::None {
            write!(f, " {operand}")?;
        }

        let children = self.children();
        if !children.is_empty() {
            write!(f, "(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(opcode: IlOpCode, left: IlNodeRc, right: IlNodeRc) -> IlNodeRc {
        IlNode::from_children(opcode, IlOperand::None, [left, right]).unwrap()
    }

    #[test]
    fn test_node_creation() {
        let node = IlNode::ldc_i4(42);
        assert_eq!(node.opcode(), IlOpCode::LdcI4);
        assert_eq!(node.operand(), IlOperand::I4(42));
        assert!(node.parent().is_none());
        assert!(!node.is_connected());
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.version(), 0);
    }

    #[test]
    fn test_from_children_fills_operands() {
        let left = IlNode::ldc_i4(1);
        let right = IlNode::ldloc(3);
        let add = binary(IlOpCode::Add, left.clone(), right.clone());

        assert!(Rc::ptr_eq(&add.child(0).unwrap(), &left));
        assert!(Rc::ptr_eq(&add.child(1).unwrap(), &right));
        assert_eq!(left.child_index(), 0);
        assert_eq!(right.child_index(), 1);
        assert!(Rc::ptr_eq(&right.parent().unwrap(), &add));
        assert_eq!(add.to_string(), "add(ldc.i4 1, ldloc V_3)");
    }

    #[test]
    fn test_from_children_trailing_collection() {
        let switch = IlNode::from_children(
            IlOpCode::Switch,
            IlOperand::None,
            [
                IlNode::ldloc(0),
                IlNode::new(IlOpCode::SwitchSection),
                IlNode::new(IlOpCode::SwitchSection),
            ],
        )
        .unwrap();

        assert_eq!(switch.child_count(), 3);
        let sections = switch.collection_named("sections").unwrap();
        assert_eq!(sections.base(), 1);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections.get(1).unwrap().child_index(), 2);
    }

    #[test]
    fn test_from_children_too_many() {
        let result = IlNode::from_children(
            IlOpCode::Return,
            IlOperand::None,
            [IlNode::ldc_i4(1), IlNode::ldc_i4(2)],
        );
        assert_eq!(
            result.unwrap_err(),
            Error::TooManyChildren {
                opcode: IlOpCode::Return,
                max: 1
            }
        );
    }

    #[test]
    fn test_slot_kind_errors() {
        let call = IlNode::new(IlOpCode::Call);
        assert!(matches!(
            call.slot_child(0),
            Err(Error::NotAnOperand { slot: "arguments", .. })
        ));
        assert!(matches!(call.slot_child(1), Err(Error::UnknownSlot { slot: 1, .. })));

        let ret = IlNode::new(IlOpCode::Return);
        assert!(matches!(
            ret.collection(0),
            Err(Error::NotACollection { slot: "value", .. })
        ));
        assert!(matches!(
            ret.collection_named("missing"),
            Err(Error::UnknownSlot { .. })
        ));
    }

    #[test]
    fn test_set_slot_child_notifies_once() {
        let ret = IlNode::new(IlOpCode::Return);
        let first = IlNode::ldc_i4(1);
        let second = IlNode::ldc_i4(2);

        ret.set_slot_child(0, Some(first.clone())).unwrap();
        assert_eq!(ret.version(), 1);
        assert!(first.is_connected());

        // same reference, nothing happens
        ret.set_slot_child(0, Some(first.clone())).unwrap();
        assert_eq!(ret.version(), 1);

        ret.set_slot_child(0, Some(second.clone())).unwrap();
        assert_eq!(ret.version(), 2);
        assert!(!first.is_connected());
        assert!(first.parent().is_none());
        assert!(Rc::ptr_eq(&second.parent().unwrap(), &ret));

        ret.set_slot_child(0, None).unwrap();
        assert_eq!(ret.version(), 3);
        assert!(ret.slot_child(0).unwrap().is_none());
        assert!(ret.child(0).is_none());
        assert_eq!(ret.child_count(), 1);
    }

    #[test]
    fn test_global_index_layout() {
        let try_catch = IlNode::new(IlOpCode::TryCatch);
        try_catch
            .set_slot_child(0, Some(IlNode::new(IlOpCode::BlockContainer)))
            .unwrap();
        let handlers = try_catch.collection(1).unwrap();
        handlers.add(IlNode::new(IlOpCode::CatchHandler)).unwrap();
        handlers.add(IlNode::new(IlOpCode::CatchHandler)).unwrap();

        assert_eq!(try_catch.child_count(), 3);
        for index in 0..3 {
            let child = try_catch.child(index).unwrap();
            assert_eq!(child.child_index(), index);
            assert_eq!(try_catch.find_child(&child), Some(index));
        }
        assert!(try_catch.child(3).is_none());
        assert!(IlNode::nop().child(0).is_none());
    }

    #[test]
    fn test_set_child_dispatch() {
        let switch = IlNode::from_children(
            IlOpCode::Switch,
            IlOperand::None,
            [IlNode::ldloc(0), IlNode::new(IlOpCode::SwitchSection)],
        )
        .unwrap();

        let value = IlNode::ldloc(1);
        switch.set_child(0, value.clone()).unwrap();
        assert!(Rc::ptr_eq(&switch.slot_child(0).unwrap().unwrap(), &value));

        let section = IlNode::new(IlOpCode::SwitchSection);
        switch.set_child(1, section.clone()).unwrap();
        assert_eq!(section.child_index(), 1);

        assert_eq!(
            switch.set_child(2, IlNode::nop()).unwrap_err(),
            Error::OutOfBounds { index: 2, len: 2 }
        );
    }

    #[test]
    fn test_set_child_reports_global_index() {
        let call = IlNode::from_children(
            IlOpCode::Call,
            IlOperand::Token(0x0A00_0002),
            [IlNode::ldc_i4(1)],
        )
        .unwrap();
        assert_eq!(
            call.set_child(5, IlNode::nop()).unwrap_err(),
            Error::OutOfBounds { index: 5, len: 1 }
        );

        let try_catch = IlNode::new(IlOpCode::TryCatch);
        try_catch
            .collection(1)
            .unwrap()
            .add(IlNode::new(IlOpCode::CatchHandler))
            .unwrap();
        assert_eq!(
            try_catch.set_child(3, IlNode::nop()).unwrap_err(),
            Error::OutOfBounds { index: 3, len: 2 }
        );

        let nop = IlNode::nop();
        assert_eq!(
            nop.set_child(0, IlNode::nop()).unwrap_err(),
            Error::OutOfBounds { index: 0, len: 0 }
        );
    }

    #[test]
    fn test_replace_with() {
        let left = IlNode::ldc_i4(1);
        let add = binary(IlOpCode::Add, left.clone(), IlNode::ldc_i4(2));

        let replacement = IlNode::ldloc(0);
        left.replace_with(replacement.clone()).unwrap();

        assert!(Rc::ptr_eq(&add.child(0).unwrap(), &replacement));
        assert!(left.parent().is_none());
        assert_eq!(left.replace_with(IlNode::nop()).unwrap_err(), Error::Detached);
    }

    #[test]
    fn test_remove_from_parent() {
        let first = IlNode::ldc_i4(1);
        let second = IlNode::ldc_i4(2);
        let call = IlNode::from_children(
            IlOpCode::Call,
            IlOperand::Token(0x0A00_0001),
            [first.clone(), second.clone()],
        )
        .unwrap();

        first.remove_from_parent().unwrap();
        assert_eq!(call.child_count(), 1);
        assert_eq!(second.child_index(), 0);
        assert!(!first.is_connected());

        let value = IlNode::ldc_i4(0);
        let ret =
            IlNode::from_children(IlOpCode::Return, IlOperand::None, [value.clone()]).unwrap();
        value.remove_from_parent().unwrap();
        assert!(ret.slot_child(0).unwrap().is_none());
        assert_eq!(value.remove_from_parent().unwrap_err(), Error::Detached);
    }

    #[test]
    fn test_ancestors() {
        let leaf = IlNode::ldc_i4(1);
        let add = binary(IlOpCode::Add, leaf.clone(), IlNode::ldc_i4(2));
        let ret = IlNode::from_children(IlOpCode::Return, IlOperand::None, [add.clone()]).unwrap();

        let chain: Vec<_> = leaf.ancestors().map(|n| n.opcode()).collect();
        assert_eq!(chain, vec![IlOpCode::Add, IlOpCode::Return]);
        assert!(leaf.is_descendant_of(&ret));
        assert!(leaf.is_descendant_of(&leaf));
        assert!(!ret.is_descendant_of(&leaf));
    }

    #[test]
    fn test_flags_aggregate_and_invalidate() {
        let block = IlNode::new(IlOpCode::Block);
        let instructions = block.collection(0).unwrap();
        instructions
            .add(
                IlNode::from_children(IlOpCode::StLoc, IlOperand::Local(0), [IlNode::ldc_i4(1)])
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(block.flags(), InstructionFlags::MAY_WRITE_LOCALS);

        let ret = IlNode::new(IlOpCode::Return);
        instructions.add(ret).unwrap();
        let flags = block.flags();
        assert!(flags.contains(InstructionFlags::MAY_BRANCH));
        assert!(flags.contains(InstructionFlags::END_POINT_UNREACHABLE));

        instructions.remove_at(1).unwrap();
        assert_eq!(block.flags(), InstructionFlags::MAY_WRITE_LOCALS);
    }

    #[test]
    fn test_flags_invalidate_ancestors() {
        let call = IlNode::new(IlOpCode::Call);
        let ret = IlNode::from_children(IlOpCode::Return, IlOperand::None, [call.clone()]).unwrap();
        let base = InstructionFlags::MAY_THROW | InstructionFlags::SIDE_EFFECT;
        assert_eq!(
            ret.flags(),
            base | InstructionFlags::MAY_BRANCH | InstructionFlags::END_POINT_UNREACHABLE
        );

        call.collection(0).unwrap().add(IlNode::ldloc(2)).unwrap();
        assert!(ret.flags().contains(InstructionFlags::MAY_READ_LOCALS));
    }

    #[test]
    fn test_flags_follow_latest_parent_only() {
        let call = IlNode::new(IlOpCode::Call);
        let first = IlNode::new(IlOpCode::Block);
        let second = IlNode::new(IlOpCode::Block);
        first.collection(0).unwrap().add(call.clone()).unwrap();
        second.collection(0).unwrap().add(call.clone()).unwrap();

        let base = InstructionFlags::MAY_THROW | InstructionFlags::SIDE_EFFECT;
        assert_eq!(first.flags(), base);
        assert_eq!(second.flags(), base);

        call.collection(0).unwrap().add(IlNode::ldloc(0)).unwrap();
        assert!(second.flags().contains(InstructionFlags::MAY_READ_LOCALS));
        assert_eq!(first.flags(), base);

        // a commit of its own refreshes the other owner
        first.collection(0).unwrap().add(IlNode::nop()).unwrap();
        assert!(first.flags().contains(InstructionFlags::MAY_READ_LOCALS));
    }

    #[test]
    fn test_node_ref() {
        let node = IlNode::nop();
        let weak = IlNodeRef::new(&node);
        assert!(weak.is_valid());
        assert_eq!(weak.opcode(), Some(IlOpCode::Nop));
        drop(node);
        assert!(!weak.is_valid());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    #[should_panic(expected = "ILAst must form a tree")]
    #[cfg(debug_assertions)]
    fn test_attach_cycle_panics() {
        let block = IlNode::new(IlOpCode::Block);
        let container =
            IlNode::from_children(IlOpCode::BlockContainer, IlOperand::None, [block.clone()])
                .unwrap();
        block.collection(0).unwrap().add(container).unwrap();
    }
}
