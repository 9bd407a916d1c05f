//! The ILAst decompiler tree.
//!
//! This module holds the mutable instruction tree that decompiler passes rewrite after CIL
//! decoding. Nodes own their children through typed slots, and every child caches where it
//! lives so that lookups and in-place replacements are O(1) on the common path.
//!
//! # Key Components
//!
//! - [`IlNode`] - An instruction with its opcode, immediate operand and child slots
//! - [`InstructionCollection`] - Handle over an ordered child collection of a node
//! - [`ChildCursor`] - Traversal of a collection that blocks structural edits while open
//! - [`ChildOwner`] - Notifications a collection sends to its owning node
//! - [`IlOpCode`] / [`SlotDescriptor`] - Static slot layouts per instruction kind
//! - [`InstructionFlags`] - Aggregated semantic flags, recomputed lazily after edits
//!
//! # Examples
//!
//! ```rust
//! use dotscope_ilast::ast::{IlNode, IlOpCode, IlOperand, InstructionFlags};
//!
//! let block = IlNode::new(IlOpCode::Block);
//! let instructions = block.collection_named("instructions")?;
//! instructions.add(IlNode::from_children(
//!     IlOpCode::StLoc,
//!     IlOperand::Local(0),
//!     [IlNode::ldc_i4(5)],
//! )?)?;
//! instructions.add(IlNode::from_children(
//!     IlOpCode::Return,
//!     IlOperand::None,
//!     [IlNode::ldloc(0)],
//! )?)?;
//!
//! assert!(block.flags().contains(InstructionFlags::END_POINT_UNREACHABLE));
//!
//! instructions.remove_at(1)?;
//! assert!(!block.flags().contains(InstructionFlags::END_POINT_UNREACHABLE));
//! # Ok::<(), dotscope_ilast::Error>(())
//! ```
//!
//! # Strict checks
//!
//! The traversal guard and the cursor reset check are compiled in for debug builds and for
//! builds with the `strict-traversal` feature. Release builds without the feature skip them.

mod collection;
mod cursor;
mod flags;
mod node;
mod opcode;
mod owner;

pub use collection::InstructionCollection;
pub use cursor::ChildCursor;
pub use flags::InstructionFlags;
pub use node::{IlNode, IlNodeRc, IlNodeRef};
pub use opcode::{IlOpCode, IlOperand, SlotArity, SlotDescriptor};
pub use owner::ChildOwner;

/// `true` if the traversal guard and cursor checks are compiled in.
pub const STRICT_CHECKS: bool = cfg!(any(debug_assertions, feature = "strict-traversal"));
