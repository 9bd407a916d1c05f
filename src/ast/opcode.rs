//! ILAst opcodes, immediate operands and child slot layouts.
//!
//! Every [`IlOpCode`] carries a static slot layout that describes where its children live.
//! A slot is either a single operand position ([`SlotArity::One`]) or an ordered child
//! collection ([`SlotArity::Many`]). Slots are laid out back to back in one global child-index
//! space: slot `i` starts at global index `i`. To keep these bases fixed, only the last slot of a
//! layout may be a collection.
//!
//! ```text
//! switch      value:One  sections:Many
//! global      0          1 .. 1+n
//! ```

use std::fmt;

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::ast::InstructionFlags;

/// How many children a slot can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotArity {
    /// A single operand position, holding zero or one child.
    One,
    /// An ordered child collection of arbitrary length.
    Many,
}

/// Describes one named child slot of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    /// Human readable slot name, e.g. `"arguments"`
    pub name: &'static str,
    /// Arity of the slot
    pub arity: SlotArity,
}

impl SlotDescriptor {
    /// Creates a descriptor for a single operand slot.
    #[must_use]
    pub const fn one(name: &'static str) -> Self {
        SlotDescriptor {
            name,
            arity: SlotArity::One,
        }
    }

    /// Creates a descriptor for a child collection slot.
    #[must_use]
    pub const fn many(name: &'static str) -> Self {
        SlotDescriptor {
            name,
            arity: SlotArity::Many,
        }
    }

    /// Returns `true` if this slot is a child collection.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self.arity, SlotArity::Many)
    }
}

const NO_SLOTS: &[SlotDescriptor] = &[];
const VALUE: &[SlotDescriptor] = &[SlotDescriptor::one("value")];
const BINARY: &[SlotDescriptor] = &[SlotDescriptor::one("left"), SlotDescriptor::one("right")];
const ARGUMENTS: &[SlotDescriptor] = &[SlotDescriptor::many("arguments")];
const CONDITIONAL: &[SlotDescriptor] = &[
    SlotDescriptor::one("condition"),
    SlotDescriptor::one("true_inst"),
    SlotDescriptor::one("false_inst"),
];
const SWITCH: &[SlotDescriptor] = &[
    SlotDescriptor::one("value"),
    SlotDescriptor::many("sections"),
];
const BODY: &[SlotDescriptor] = &[SlotDescriptor::one("body")];
const BLOCK: &[SlotDescriptor] = &[SlotDescriptor::many("instructions")];
const CONTAINER: &[SlotDescriptor] = &[SlotDescriptor::many("blocks")];
const TRY_CATCH: &[SlotDescriptor] = &[
    SlotDescriptor::one("try_block"),
    SlotDescriptor::many("handlers"),
];

/// The instruction kinds of the ILAst.
///
/// This is the reduced instruction set the decompiler tree works with after CIL decoding: stack
/// operations have been turned into expression trees and structured control flow is represented
/// by nested containers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, IntoStaticStr,
)]
pub enum IlOpCode {
    /// No operation
    #[strum(serialize = "nop")]
    Nop,
    /// Load a 32-bit integer constant
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    /// Load a 64-bit integer constant
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    /// Load a local variable
    #[strum(serialize = "ldloc")]
    LdLoc,
    /// Store a value into a local variable
    #[strum(serialize = "stloc")]
    StLoc,
    /// Integer addition
    #[strum(serialize = "add")]
    Add,
    /// Integer subtraction
    #[strum(serialize = "sub")]
    Sub,
    /// Integer multiplication
    #[strum(serialize = "mul")]
    Mul,
    /// Integer division, throws on a zero divisor
    #[strum(serialize = "div")]
    Div,
    /// Method call
    #[strum(serialize = "call")]
    Call,
    /// Object construction
    #[strum(serialize = "newobj")]
    NewObj,
    /// Two-way conditional
    #[strum(serialize = "if")]
    If,
    /// Multi-way branch on an integer value
    #[strum(serialize = "switch")]
    Switch,
    /// A single `case` of a switch
    #[strum(serialize = "case")]
    SwitchSection,
    /// Sequence of instructions without internal control flow
    #[strum(serialize = "block")]
    Block,
    /// Container of blocks forming a control flow graph
    #[strum(serialize = "container")]
    BlockContainer,
    /// Protected region with handlers
    #[strum(serialize = "try.catch")]
    TryCatch,
    /// A `catch` handler of a protected region
    #[strum(serialize = "catch")]
    CatchHandler,
    /// Unconditional branch to a block
    #[strum(serialize = "br")]
    Branch,
    /// Leaves a block container
    #[strum(serialize = "leave")]
    Leave,
    /// Return from the method, with an optional value
    #[strum(serialize = "ret")]
    Return,
    /// Throw an exception object
    #[strum(serialize = "throw")]
    Throw,
}

impl IlOpCode {
    /// Returns the child slot layout of this opcode.
    #[must_use]
    pub const fn slots(self) -> &'static [SlotDescriptor] {
        match self {
            IlOpCode::Nop
            | IlOpCode::LdcI4
            | IlOpCode::LdcI8
            | IlOpCode::LdLoc
            | IlOpCode::Branch
            | IlOpCode::Leave => NO_SLOTS,
            IlOpCode::StLoc | IlOpCode::Return | IlOpCode::Throw => VALUE,
            IlOpCode::Add | IlOpCode::Sub | IlOpCode::Mul | IlOpCode::Div => BINARY,
            IlOpCode::Call | IlOpCode::NewObj => ARGUMENTS,
            IlOpCode::If => CONDITIONAL,
            IlOpCode::Switch => SWITCH,
            IlOpCode::SwitchSection | IlOpCode::CatchHandler => BODY,
            IlOpCode::Block => BLOCK,
            IlOpCode::BlockContainer => CONTAINER,
            IlOpCode::TryCatch => TRY_CATCH,
        }
    }

    /// Returns the descriptor of `slot`, if the layout has one.
    #[must_use]
    pub fn slot(self, slot: usize) -> Option<&'static SlotDescriptor> {
        self.slots().get(slot)
    }

    /// Looks up a slot index by its name.
    #[must_use]
    pub fn slot_index(self, name: &str) -> Option<usize> {
        self.slots().iter().position(|s| s.name == name)
    }

    /// Returns the maximum number of children, or `None` if the layout ends in a collection.
    #[must_use]
    pub fn max_children(self) -> Option<usize> {
        let slots = self.slots();
        if slots.iter().any(SlotDescriptor::is_collection) {
            None
        } else {
            Some(slots.len())
        }
    }

    /// Flags this instruction has on its own, without looking at its children.
    #[must_use]
    pub const fn direct_flags(self) -> InstructionFlags {
        match self {
            IlOpCode::LdLoc => InstructionFlags::MAY_READ_LOCALS,
            IlOpCode::StLoc => InstructionFlags::MAY_WRITE_LOCALS,
            IlOpCode::Div => InstructionFlags::MAY_THROW,
            IlOpCode::Call | IlOpCode::NewObj => {
                InstructionFlags::MAY_THROW.union(InstructionFlags::SIDE_EFFECT)
            }
            IlOpCode::If | IlOpCode::Switch | IlOpCode::TryCatch => InstructionFlags::CONTROL_FLOW,
            IlOpCode::Branch | IlOpCode::Leave | IlOpCode::Return => {
                InstructionFlags::MAY_BRANCH.union(InstructionFlags::END_POINT_UNREACHABLE)
            }
            IlOpCode::Throw => {
                InstructionFlags::MAY_THROW.union(InstructionFlags::END_POINT_UNREACHABLE)
            }
            _ => InstructionFlags::empty(),
        }
    }
}

/// Immediate operand of an instruction.
///
/// Children are expressed through slots; this is only for values that are encoded directly in
/// the instruction, like constants or variable indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IlOperand {
    /// No immediate operand
    #[default]
    None,
    /// 32-bit integer constant
    I4(i32),
    /// 64-bit integer constant
    I8(i64),
    /// Local variable index
    Local(u16),
    /// Branch target, identified by the block index inside its container
    Target(u32),
    /// Metadata token of a method, type or field
    Token(u32),
}

impl fmt::Display for IlOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IlOperand::None => Ok(()),
            IlOperand::I4(value) => write!(f, "{value}"),
            IlOperand::I8(value) => write!(f, "{value}L"),
            IlOperand::Local(index) => write!(f, "V_{index}"),
            IlOperand::Target(block) => write!(f, "IL_{block:04x}"),
            IlOperand::Token(token) => write!(f, "0x{token:08X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_collection_slot_is_always_last() {
        for opcode in IlOpCode::iter() {
            let slots = opcode.slots();
            for (index, slot) in slots.iter().enumerate() {
                if slot.is_collection() {
                    assert_eq!(index, slots.len() - 1, "{opcode} has a collection in the middle");
                }
            }
        }
    }

    #[test]
    fn test_slot_lookup() {
        assert_eq!(IlOpCode::Switch.slot_index("value"), Some(0));
        assert_eq!(IlOpCode::Switch.slot_index("sections"), Some(1));
        assert_eq!(IlOpCode::Switch.slot_index("body"), None);
        assert!(IlOpCode::Switch.slot(1).unwrap().is_collection());
        assert!(IlOpCode::Nop.slot(0).is_none());
    }

    #[test]
    fn test_max_children() {
        assert_eq!(IlOpCode::Add.max_children(), Some(2));
        assert_eq!(IlOpCode::Nop.max_children(), Some(0));
        assert_eq!(IlOpCode::Call.max_children(), None);
        assert_eq!(IlOpCode::TryCatch.max_children(), None);
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(IlOpCode::LdcI4.to_string(), "ldc.i4");
        assert_eq!(IlOpCode::TryCatch.to_string(), "try.catch");
        let name: &'static str = IlOpCode::BlockContainer.into();
        assert_eq!(name, "container");
    }

    #[test]
    fn test_operand_display() {
        assert_eq!(IlOperand::None.to_string(), "");
        assert_eq!(IlOperand::I4(-3).to_string(), "-3");
        assert_eq!(IlOperand::I8(7).to_string(), "7L");
        assert_eq!(IlOperand::Local(2).to_string(), "V_2");
        assert_eq!(IlOperand::Target(0x1a).to_string(), "IL_001a");
        assert_eq!(IlOperand::Token(0x0600_0001).to_string(), "0x06000001");
    }

    #[test]
    fn test_direct_flags() {
        assert!(IlOpCode::Call
            .direct_flags()
            .contains(InstructionFlags::MAY_THROW | InstructionFlags::SIDE_EFFECT));
        assert!(IlOpCode::Return
            .direct_flags()
            .contains(InstructionFlags::END_POINT_UNREACHABLE));
        assert!(IlOpCode::Block.direct_flags().is_empty());
    }
}
