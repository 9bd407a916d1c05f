// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotscope-ilast
//!
//! The mutable instruction tree of the dotscope decompiler.
//!
//! After CIL bytecode has been decoded, decompiler passes work on an ILAst: a tree of
//! instructions where stack traffic has become nested expressions and control flow has become
//! nested containers. Passes rewrite this tree constantly, inserting, removing and replacing
//! children, often while another pass walks over it. This crate provides the child storage for
//! that tree:
//!
//! - **Positional back-references** - Every child caches its parent and index, which makes
//!   lookups O(1) and stays correct when a node is briefly held by two collections
//! - **Owner notifications** - Each edit reports attached and detached children, then commits
//!   once so the owner can recompute aggregate state a single time
//! - **Guarded traversal** - Cursors reject structural edits of the collection they walk, while
//!   in-place replacement stays allowed
//! - **Bulk edits** - Range appends, list replacement and single-pass predicate removal
//!
//! ## Quick Start
//!
//! ```rust
//! use dotscope_ilast::prelude::*;
//!
//! let call = IlNode::with_operand(IlOpCode::Call, IlOperand::Token(0x0A00_0010));
//! let arguments = call.collection(0)?;
//! arguments.add_range([IlNode::ldloc(0), IlNode::ldc_i4(1), IlNode::ldloc(1)])?;
//!
//! // drop constant arguments in one pass
//! let removed = arguments.remove_all(|arg| arg.opcode() == IlOpCode::LdcI4)?;
//! assert_eq!(removed, 1);
//! assert_eq!(call.to_string(), "call 0x0A000010(ldloc V_0, ldloc V_1)");
//!
//! // the cached position of the last argument followed the compaction
//! let last = arguments.last().unwrap();
//! assert_eq!(last.child_index(), 1);
//! # Ok::<(), dotscope_ilast::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], with [`Error`] describing out-of-range
//! positions, invalid slots and edits attempted during a traversal.

/// The ILAst node tree, child collections and traversal cursors.
pub mod ast;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotscope_ilast::prelude::*;
///
/// let block = IlNode::new(IlOpCode::Block);
/// let instructions: InstructionCollection = block.collection(0)?;
/// assert!(instructions.is_empty());
/// # Ok::<(), dotscope_ilast::Error>(())
/// ```
pub mod prelude;

mod error;

/// `dotscope-ilast` Result type.
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust
/// use dotscope_ilast::{ast::IlNodeRc, Result};
///
/// fn second_child(node: &IlNodeRc) -> Result<IlNodeRc> {
///     node.collection(0)?.get(1)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotscope-ilast` Error type.
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use dotscope_ilast::{ast::{IlNode, IlOpCode}, Error};
///
/// let block = IlNode::new(IlOpCode::Block);
/// match block.collection(0)?.get(0) {
///     Err(Error::OutOfBounds { index, len }) => assert_eq!((index, len), (0, 0)),
///     other => panic!("unexpected {other:?}"),
/// }
/// # Ok::<(), Error>(())
/// ```
pub use error::Error;
