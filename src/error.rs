use thiserror::Error;

use crate::ast::IlOpCode;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure in this crate is a programming error on the side of the caller, for example a
/// wrongly computed index or a structural edit nested inside an open traversal. Nothing is
/// retried internally.
///
/// # Error Categories
///
/// ## Collection Errors
/// - [`Error::OutOfBounds`] - Indexed access outside of `[0, len)`
/// - [`Error::InvalidDuringTraversal`] - Structural edit while a cursor is open
/// - [`Error::CursorReset`] - Attempted to rewind a cursor that already started
/// - [`Error::NoCurrentElement`] - Cursor is before the first or past the last element
/// - [`Error::MissingOwner`] - The owner of a collection is no longer alive
///
/// ## Node Layout Errors
/// - [`Error::UnknownSlot`] - Slot index is not part of the opcode layout
/// - [`Error::NotACollection`] - Collection requested for a single-operand slot
/// - [`Error::NotAnOperand`] - Single operand requested for a collection slot
/// - [`Error::TooManyChildren`] - More children than the layout can hold
/// - [`Error::Detached`] - Node has no parent to operate on
///
/// # Examples
///
/// ```rust
/// use dotscope_ilast::{ast::{IlNode, IlOpCode}, Error};
///
/// let block = IlNode::new(IlOpCode::Block);
/// let instructions = block.collection(0)?;
///
/// match instructions.get(3) {
///     Err(Error::OutOfBounds { index, len }) => {
///         eprintln!("index {} is outside of {} instructions", index, len);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
///     Ok(node) => println!("{}", node),
/// }
/// # Ok::<(), dotscope_ilast::Error>(())
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An index outside of the valid range was used.
    ///
    /// For reads and in-place replacement the valid range is `[0, len)`, for insertion it is
    /// `[0, len]`. Indices are never clamped.
    ///
    /// # Fields
    ///
    /// * `index` - The offending index
    /// * `len` - The length of the collection at the time of the call
    #[error("Index {index} is out of range for a collection of {len} elements")]
    OutOfBounds {
        /// The index that was requested
        index: usize,
        /// The number of elements in the collection
        len: usize,
    },

    /// A structural modification was attempted while a traversal cursor is open.
    ///
    /// Only raised when strict checks are compiled in (debug builds, or the `strict-traversal`
    /// feature). In-place replacement through `set` is exempt.
    #[error("Collection of '{opcode}' was modified while {depth} enumeration(s) are active")]
    InvalidDuringTraversal {
        /// The opcode of the node owning the collection
        opcode: IlOpCode,
        /// The number of cursors that are currently open on the owner
        depth: u32,
    },

    /// A traversal cursor that already started can not be rewound.
    #[error("Traversal cursor can not be reset once it has started")]
    CursorReset,

    /// The traversal cursor is not positioned on an element.
    ///
    /// Raised when replacing the current element before the first advance or after exhaustion.
    #[error("Traversal cursor is not positioned on an element")]
    NoCurrentElement,

    /// The owner of a child collection has been dropped.
    ///
    /// A collection always needs a live owner to notify, so constructing one from a dangling
    /// [`crate::ast::IlNodeRef`] is rejected right away.
    #[error("The owner of the child collection is no longer alive")]
    MissingOwner,

    /// The slot index is not part of the layout of this opcode.
    #[error("'{opcode}' has no slot {slot}")]
    UnknownSlot {
        /// The opcode whose layout was consulted
        opcode: IlOpCode,
        /// The requested slot index
        slot: usize,
    },

    /// A child collection was requested for a slot that holds a single operand.
    #[error("Slot '{slot}' of '{opcode}' holds a single operand, not a collection")]
    NotACollection {
        /// The opcode whose layout was consulted
        opcode: IlOpCode,
        /// The name of the slot
        slot: &'static str,
    },

    /// A single operand was requested for a slot that is a child collection.
    #[error("Slot '{slot}' of '{opcode}' is a child collection, not a single operand")]
    NotAnOperand {
        /// The opcode whose layout was consulted
        opcode: IlOpCode,
        /// The name of the slot
        slot: &'static str,
    },

    /// More children were supplied than the slot layout of the opcode can hold.
    #[error("'{opcode}' accepts at most {max} children")]
    TooManyChildren {
        /// The opcode whose layout was consulted
        opcode: IlOpCode,
        /// The maximum number of children
        max: usize,
    },

    /// The node is not attached to a live parent, or the parent no longer holds it.
    #[error("Instruction is not attached to a parent")]
    Detached,
}
