//! The function-shaped interface the register allocator consumes.
//!
//! SPEC_FULL.md describes the allocator as operating on "a pseudo-instruction stream and a
//! CFG view" without naming a concrete instruction format, since the same allocator runs
//! after any ISA's instruction selector. Grounded on the original engine's
//! `regalloc.Function`/`Block`/`Instr` interfaces (see `machine_regalloc.go` in the retrieved
//! original source), this is expressed as a pair of Rust traits rather than one fixed
//! `InstructionData` type; `isa::aarch64`'s pseudo-instructions are the sole implementor.

use crate::ir::Value;
use crate::isa::registers::{RegClass, RegUnit};
use crate::regalloc::vreg::SpillSlot;

/// A virtual register: an SSA value carried through lowering into the pseudo-instruction
/// stream, not yet assigned a physical location.
pub type VReg = Value;

/// One instruction in the pseudo-instruction stream, from the allocator's point of view.
pub trait RaInst {
    /// Values defined by this instruction (written).
    fn defs(&self) -> std::vec::Vec<VReg>;
    /// Values used by this instruction (read).
    fn uses(&self) -> std::vec::Vec<VReg>;
    /// Is this a register-to-register copy the allocator may try to coalesce away?
    fn is_copy(&self) -> bool {
        false
    }
    /// Does this instruction clobber every caller-saved register (a direct or indirect call)?
    fn is_call(&self) -> bool {
        false
    }
    /// Is this specifically an indirect call (through a table slot)?
    fn is_indirect_call(&self) -> bool {
        false
    }
    /// Is this a function return?
    fn is_return(&self) -> bool {
        false
    }
}

/// A pseudo-instruction stream, organized into blocks, that the allocator assigns registers
/// within. Implementors own both the instructions and the mutating hooks the allocator calls
/// to record its decisions.
pub trait RaFunction {
    /// The allocator's view of one basic block.
    type Block: Copy + Eq + core::hash::Hash + core::fmt::Debug;
    /// The allocator's view of one instruction.
    type Inst: RaInst;

    /// Blocks in reverse post-order (entry first, each block after at least one predecessor).
    fn blocks_rpo(&self) -> std::vec::Vec<Self::Block>;

    /// The predecessors of `block`.
    fn block_preds(&self, block: Self::Block) -> &[Self::Block];

    /// The successors of `block`.
    fn block_succs(&self, block: Self::Block) -> &[Self::Block];

    /// The block-parameter vregs `block` defines at entry.
    fn block_params(&self, block: Self::Block) -> &[VReg];

    /// Instructions belonging to `block`, in program order. Excludes any spill/reload
    /// instructions the allocator has already spliced in during a prior pass, so repeated
    /// passes see a stable view (SPEC_FULL.md section 4.4).
    fn block_insts(&self, block: Self::Block) -> &[Self::Inst];

    /// The register class a vreg must be allocated from.
    fn vreg_class(&self, vreg: VReg) -> RegClass;

    /// The width in bytes of a vreg's value, for spill-slot sizing (4, 8, or 16).
    fn vreg_bytes(&self, vreg: VReg) -> u32;

    /// Record that `vreg` has been assigned to `unit` at its definition in `block`,
    /// instruction index `inst_index` (an index into `block_insts`).
    fn assign_def(&mut self, block: Self::Block, inst_index: usize, vreg: VReg, unit: RegUnit);

    /// Record that `vreg` is read from `unit` at a use in `block`, instruction index
    /// `inst_index`.
    fn assign_use(&mut self, block: Self::Block, inst_index: usize, vreg: VReg, unit: RegUnit);

    /// Splice in a store of `vreg` to `slot` immediately before the instruction at
    /// `inst_index` in `block`. Used to spill a value that's live across a call and
    /// currently occupies a caller-saved register.
    ///
    /// Only this direction (store before) and `reload_register_after` are needed: every spill
    /// point this allocator introduces is a call site, where a caller-saved value must be
    /// saved before the clobbering instruction and restored after control returns. A value
    /// spilled for any other reason is never re-homed mid-block, so the symmetric directions
    /// (reloading before a def, storing after a use) have no caller and are deliberately not
    /// part of this trait.
    fn store_register_before(
        &mut self,
        vreg: VReg,
        block: Self::Block,
        inst_index: usize,
        slot: SpillSlot,
    );

    /// Splice in a reload of `vreg` from `slot` immediately after the instruction at
    /// `inst_index` in `block`.
    fn reload_register_after(
        &mut self,
        vreg: VReg,
        block: Self::Block,
        inst_index: usize,
        slot: SpillSlot,
    );
}
