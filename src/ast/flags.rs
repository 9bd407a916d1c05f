//! Aggregate instruction flags.
//!
//! Every [`crate::ast::IlNode`] caches the union of its own flags and the flags of its
//! subtree. The cache is invalidated by the commit notification of any child collection and is
//! recomputed lazily on the next query, so a bulk edit only pays for one recomputation.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Semantic properties of an instruction and its subtree
    pub struct InstructionFlags: u32 {
        /// The instruction may read from a local variable
        const MAY_READ_LOCALS = 0x0001;
        /// The instruction may write to a local variable
        const MAY_WRITE_LOCALS = 0x0002;
        /// The instruction has observable side effects beyond locals
        const SIDE_EFFECT = 0x0004;
        /// The instruction may throw an exception
        const MAY_THROW = 0x0008;
        /// The instruction may transfer control to a block outside of itself
        const MAY_BRANCH = 0x0010;
        /// The instruction contains structured control flow
        const CONTROL_FLOW = 0x0020;
        /// Control never reaches the end of the instruction
        const END_POINT_UNREACHABLE = 0x0040;
    }
}

impl InstructionFlags {
    /// Flags that describe the end point of the instruction itself and never propagate to the
    /// parent.
    pub const NON_PROPAGATING: InstructionFlags = InstructionFlags::END_POINT_UNREACHABLE;

    /// Returns the part of `self` that is inherited by a parent instruction.
    #[must_use]
    pub const fn propagated(self) -> InstructionFlags {
        self.difference(Self::NON_PROPAGATING)
    }

    /// Returns `true` if evaluating the instruction can be observed by other code.
    #[must_use]
    pub const fn has_side_effects(self) -> bool {
        self.intersects(
            InstructionFlags::SIDE_EFFECT
                .union(InstructionFlags::MAY_WRITE_LOCALS)
                .union(InstructionFlags::MAY_THROW),
        )
    }
}
