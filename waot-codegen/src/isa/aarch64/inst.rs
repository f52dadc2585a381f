//! The AArch64 pseudo-instruction: the unit the instruction selector emits, the register
//! allocator colors, and the finalize/encode stage turns into bytes.
//!
//! Grounded on SPEC_FULL.md section 4.3's operand-form list and section 4.5's prologue and
//! branch-resolution notes; shaped like the teacher's per-ISA `inst.isle`/`MInst` enum
//! (see `isa/arm64` throughout the teacher tree) but hand-written rather than generated,
//! since this crate's instruction set is fixed and small.

use smallvec::{smallvec, SmallVec};

use crate::ir::{IntCC, TrapCode, Type};
use crate::isa::registers::RegUnit;
use crate::regalloc::api::{RaInst, VReg};
use crate::regalloc::vreg::SpillSlot;

/// A register operand: either a not-yet-colored vreg or (after register allocation) a real
/// unit. Lowering always produces `Virtual`; the allocator's `assign_def`/`assign_use` hooks
/// rewrite the corresponding slot to `Real` in place.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg {
    /// Not yet allocated.
    Virtual(VReg),
    /// Allocated to a physical register unit.
    Real(RegUnit),
}

impl Reg {
    /// The vreg this operand started as, before allocation.
    pub fn vreg(self) -> Option<VReg> {
        match self {
            Reg::Virtual(v) => Some(v),
            Reg::Real(_) => None,
        }
    }

    fn set_real(&mut self, unit: RegUnit) {
        *self = Reg::Real(unit);
    }
}

/// A shift applied to a register operand (`LSL`/`LSR`/`ASR #imm`), per SPEC_FULL.md 4.3.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
}

/// A sign/zero extension applied to a narrower register operand.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExtendOp {
    Sxtb,
    Sxth,
    Sxtw,
    Uxtw,
}

/// An addressing mode for a load or store.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddrMode {
    /// `[base]`.
    Base(Reg),
    /// `[base, #imm]`.
    BaseImm(Reg, i32),
    /// `[base, reg]`.
    BaseReg(Reg, Reg),
    /// `[base, reg, LSL #shift]`.
    BaseRegShift(Reg, Reg, u8),
    /// `[base], #imm` (post-indexed).
    PostIndexed(Reg, i32),
    /// `[base, #imm]!` (pre-indexed).
    PreIndexed(Reg, i32),
    /// A symbolic frame-relative slot, resolved to a concrete `AddrMode::BaseImm` during
    /// finalize (SPEC_FULL.md section 4.5, "Symbolic operand resolution").
    Symbolic(FrameSlot),
}

/// A not-yet-resolved stack location, expressed relative to frame regions whose sizes are
/// only known once register allocation and frame layout have run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FrameSlot {
    /// `#arg_space + k`: an incoming stack argument.
    IncomingArg(u32),
    /// `#ret_space + k`: an outgoing stack return value at the caller's return site.
    OutgoingRet(u32),
    /// A register allocator spill slot.
    Spill(SpillSlot),
    /// A callee-saved register's save slot, numbered in push order.
    CalleeSave(u32),
}

/// Integer ALU operation selected for `AluOp` instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Sdiv,
    Udiv,
    And,
    Orr,
    Eor,
    Lsl,
    Lsr,
    Asr,
}

/// Floating-point ALU operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// One AArch64 pseudo-instruction.
#[derive(Clone, Debug)]
pub enum Inst {
    /// Move an immediate into a register (`movz`/`movn`/`movk` sequence, or `fmov` for a
    /// float bit pattern folded as a PC-relative literal load — see `Inst::LoadFpuConst`).
    MovImm { dst: Reg, imm: i64, ty: Type },
    /// Load an `f32`/`f64` constant from an inline literal placed just after a `b` that
    /// jumps over it (SPEC_FULL.md section 4.3's PC-relative literal operand form).
    LoadFpuConst { dst: Reg, bits: u64, ty: Type },
    /// Register-to-register move; the allocator recognizes this via `is_copy` and tries to
    /// coalesce `dst` into `src`'s register.
    Mov { dst: Reg, src: Reg },
    /// Integer ALU op, register operands.
    AluRRR { op: AluOp, dst: Reg, lhs: Reg, rhs: Reg },
    /// Integer ALU op, register + immediate (bitmask/add-sub 12-bit immediate).
    AluRRImm { op: AluOp, dst: Reg, src: Reg, imm: i64 },
    /// Floating-point ALU op.
    FpuRRR { op: FpuOp, dst: Reg, lhs: Reg, rhs: Reg },
    /// Integer compare, setting condition flags (`cmp`/`subs` discarding the result).
    Cmp { lhs: Reg, rhs: Reg },
    /// Floating compare (`fcmp`).
    FCmp { lhs: Reg, rhs: Reg },
    /// Materialize a boolean (0/1) from condition flags (`cset`).
    CSet { dst: Reg, cond: IntCC },
    /// Sign or zero extend.
    Extend { dst: Reg, src: Reg, op: ExtendOp },
    /// Load from memory.
    Load { dst: Reg, addr: AddrMode, ty: Type },
    /// Store to memory.
    Store { src: Reg, addr: AddrMode, ty: Type },
    /// Direct call (`bl`) to a relocatable target; `callee_index` is the module-level
    /// function index the binemit stage turns into a relocation record.
    Call { callee_index: u32, uses: std::vec::Vec<Reg>, defs: std::vec::Vec<Reg> },
    /// Indirect call (`blr`) through a register holding the callee's code address, after a
    /// type-ID check the lowering stage already emitted.
    CallIndirect { callee: Reg, uses: std::vec::Vec<Reg>, defs: std::vec::Vec<Reg> },
    /// Unconditional jump to a block (resolved to `b` during finalize).
    Jump { target: BlockLabel },
    /// Conditional branch (`b.cond`, long form: inverted `b.cond` over a `b`).
    CondBr { cond: IntCC, taken: BlockLabel, not_taken: BlockLabel },
    /// `cbz`/`cbnz`: compare-and-branch on a single register against zero.
    CbzCbnz { reg: Reg, is_nonzero: bool, taken: BlockLabel, not_taken: BlockLabel },
    /// Multi-way branch table.
    BrTable { index: Reg, targets: std::vec::Vec<BlockLabel>, default: BlockLabel },
    /// Unconditionally trap, writing `code` to the execution-context record first.
    Trap { code: TrapCode, ectx: Reg },
    /// Trap if `cond_reg` is (non)zero.
    CondTrap { cond_reg: Reg, trap_if_nonzero: bool, code: TrapCode, ectx: Reg },
    /// Function epilogue + return.
    Ret { uses: std::vec::Vec<Reg> },
    /// Allocator-inserted spill: store `src` to `slot` (`StoreRegisterBefore`).
    SpillStore { src: Reg, slot: SpillSlot, ty: Type },
    /// Allocator-inserted reload: load `dst` from `slot` (`ReloadRegisterAfter`).
    SpillReload { dst: Reg, slot: SpillSlot, ty: Type },
}

/// A block's identity from the pseudo-instruction stream's point of view, used by branches
/// before finalize resolves them to PC-relative displacements.
pub type BlockLabel = crate::ir::Ebb;

impl Inst {
    /// Most instructions define and use at most a handful of registers, so the scratch lists
    /// `defs()`/`uses()` build from stay on the stack instead of allocating (same reasoning
    /// as the teacher's own per-instruction operand lists).
    fn reg_fields(&self) -> (SmallVec<[&Reg; 4]>, SmallVec<[&Reg; 4]>) {
        let (mut defs, mut uses): (SmallVec<[&Reg; 4]>, SmallVec<[&Reg; 4]>) = (SmallVec::new(), SmallVec::new());
        match self {
            Inst::MovImm { dst, .. } | Inst::LoadFpuConst { dst, .. } => defs.push(dst),
            Inst::Mov { dst, src } => {
                defs.push(dst);
                uses.push(src);
            }
            Inst::AluRRR { dst, lhs, rhs, .. } => {
                defs.push(dst);
                uses.push(lhs);
                uses.push(rhs);
            }
            Inst::AluRRImm { dst, src, .. } => {
                defs.push(dst);
                uses.push(src);
            }
            Inst::FpuRRR { dst, lhs, rhs, .. } => {
                defs.push(dst);
                uses.push(lhs);
                uses.push(rhs);
            }
            Inst::Cmp { lhs, rhs } | Inst::FCmp { lhs, rhs } => {
                uses.push(lhs);
                uses.push(rhs);
            }
            Inst::CSet { dst, .. } => defs.push(dst),
            Inst::Extend { dst, src, .. } => {
                defs.push(dst);
                uses.push(src);
            }
            Inst::Load { dst, addr, .. } => {
                defs.push(dst);
                uses.extend(addr_regs(addr));
            }
            Inst::Store { src, addr, .. } => {
                uses.push(src);
                uses.extend(addr_regs(addr));
            }
            Inst::Call { uses: u, defs: d, .. } => {
                uses.extend(u.iter());
                defs.extend(d.iter());
            }
            Inst::CallIndirect { callee, uses: u, defs: d } => {
                uses.push(callee);
                uses.extend(u.iter());
                defs.extend(d.iter());
            }
            Inst::CbzCbnz { reg, .. } => uses.push(reg),
            Inst::BrTable { index, .. } => uses.push(index),
            Inst::Trap { ectx, .. } => uses.push(ectx),
            Inst::CondTrap { cond_reg, ectx, .. } => {
                uses.push(cond_reg);
                uses.push(ectx);
            }
            Inst::Ret { uses: u } => uses.extend(u.iter()),
            Inst::SpillStore { src, .. } => uses.push(src),
            Inst::SpillReload { dst, .. } => defs.push(dst),
            Inst::Jump { .. } | Inst::CondBr { .. } => {}
        }
        (defs, uses)
    }

    /// Assign a colored physical unit to one of this instruction's def operands (the one
    /// holding `vreg`).
    pub fn assign_def(&mut self, vreg: VReg, unit: RegUnit) {
        self.for_each_reg_mut(|r| {
            if r.vreg() == Some(vreg) {
                r.set_real(unit);
            }
        });
    }

    /// Assign a colored physical unit to one of this instruction's use operands.
    pub fn assign_use(&mut self, vreg: VReg, unit: RegUnit) {
        self.assign_def(vreg, unit);
    }

    fn for_each_reg_mut(&mut self, mut f: impl FnMut(&mut Reg)) {
        match self {
            Inst::MovImm { dst, .. } | Inst::LoadFpuConst { dst, .. } => f(dst),
            Inst::Mov { dst, src } => {
                f(dst);
                f(src);
            }
            Inst::AluRRR { dst, lhs, rhs, .. } => {
                f(dst);
                f(lhs);
                f(rhs);
            }
            Inst::AluRRImm { dst, src, .. } => {
                f(dst);
                f(src);
            }
            Inst::FpuRRR { dst, lhs, rhs, .. } => {
                f(dst);
                f(lhs);
                f(rhs);
            }
            Inst::Cmp { lhs, rhs } | Inst::FCmp { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            Inst::CSet { dst, .. } => f(dst),
            Inst::Extend { dst, src, .. } => {
                f(dst);
                f(src);
            }
            Inst::Load { dst, addr, .. } => {
                f(dst);
                addr_regs_mut(addr, &mut f);
            }
            Inst::Store { src, addr, .. } => {
                f(src);
                addr_regs_mut(addr, &mut f);
            }
            Inst::Call { uses, defs, .. } => {
                uses.iter_mut().for_each(&mut f);
                defs.iter_mut().for_each(&mut f);
            }
            Inst::CallIndirect { callee, uses, defs } => {
                f(callee);
                uses.iter_mut().for_each(&mut f);
                defs.iter_mut().for_each(&mut f);
            }
            Inst::CbzCbnz { reg, .. } => f(reg),
            Inst::BrTable { index, .. } => f(index),
            Inst::Trap { ectx, .. } => f(ectx),
            Inst::CondTrap { cond_reg, ectx, .. } => {
                f(cond_reg);
                f(ectx);
            }
            Inst::Ret { uses } => uses.iter_mut().for_each(&mut f),
            Inst::SpillStore { src, .. } => f(src),
            Inst::SpillReload { dst, .. } => f(dst),
            Inst::Jump { .. } | Inst::CondBr { .. } => {}
        }
    }
}

fn addr_regs(addr: &AddrMode) -> SmallVec<[&Reg; 2]> {
    match addr {
        AddrMode::Base(b) | AddrMode::BaseImm(b, _) | AddrMode::PostIndexed(b, _) | AddrMode::PreIndexed(b, _) => {
            smallvec![b]
        }
        AddrMode::BaseReg(b, i) | AddrMode::BaseRegShift(b, i, _) => smallvec![b, i],
        AddrMode::Symbolic(_) => SmallVec::new(),
    }
}

fn addr_regs_mut(addr: &mut AddrMode, f: &mut impl FnMut(&mut Reg)) {
    match addr {
        AddrMode::Base(b) | AddrMode::BaseImm(b, _) | AddrMode::PostIndexed(b, _) | AddrMode::PreIndexed(b, _) => f(b),
        AddrMode::BaseReg(b, i) | AddrMode::BaseRegShift(b, i, _) => {
            f(b);
            f(i);
        }
        AddrMode::Symbolic(_) => {}
    }
}

impl RaInst for Inst {
    fn defs(&self) -> std::vec::Vec<VReg> {
        self.reg_fields().0.into_iter().filter_map(|r| r.vreg()).collect()
    }

    fn uses(&self) -> std::vec::Vec<VReg> {
        self.reg_fields().1.into_iter().filter_map(|r| r.vreg()).collect()
    }

    fn is_copy(&self) -> bool {
        matches!(self, Inst::Mov { .. })
    }

    fn is_call(&self) -> bool {
        matches!(self, Inst::Call { .. } | Inst::CallIndirect { .. })
    }

    fn is_indirect_call(&self) -> bool {
        matches!(self, Inst::CallIndirect { .. })
    }

    fn is_return(&self) -> bool {
        matches!(self, Inst::Ret { .. })
    }
}
