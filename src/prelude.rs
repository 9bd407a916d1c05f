//! # dotscope-ilast Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits of the
//! ILAst. Import it to get quick access to nodes, collections and cursors.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ILAst operations
pub use crate::Error;

/// The result type used throughout the crate
pub use crate::Result;

// ================================================================================================
// Tree
// ================================================================================================

/// Instruction nodes and their shared handles
pub use crate::ast::{IlNode, IlNodeRc, IlNodeRef};

/// Instruction kinds, immediate operands and slot layouts
pub use crate::ast::{IlOpCode, IlOperand, SlotArity, SlotDescriptor};

/// Aggregated instruction flags
pub use crate::ast::InstructionFlags;

// ================================================================================================
// Child Collections
// ================================================================================================

/// Ordered child collections and their guarded cursor
pub use crate::ast::{ChildCursor, InstructionCollection};

/// Notifications a collection sends to its owner
pub use crate::ast::ChildOwner;
