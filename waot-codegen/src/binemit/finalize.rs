//! The finalize/encode driver (SPEC_FULL.md section 4.5): turns a register-allocated
//! `LoweredFunction` into a byte buffer plus its relocation and trap tables.
//!
//! Grounded on the teacher's `Context::compile`/`relax_branches` split (compute layout and
//! offsets, then emit), simplified per SPEC_FULL.md's observation that every instruction in
//! this backend has a fixed width known up front (4 bytes, or 8/12 for an inline f32/f64
//! literal sequence), so a single forward pass computes every block's final offset before the
//! emitting pass runs; there is no branch-shrinking iteration to fix a point over.

use std::collections::HashMap;

use log::debug;
use waot_entity::EntityRef;

use crate::binemit::{CodeBuffer, CodeOffset, RelocationSite, TrapSite};
use crate::ir::Ebb;
use crate::isa::aarch64::emit;
use crate::isa::aarch64::inst::{FrameSlot, Inst};
use crate::isa::aarch64::lower::LoweredFunction;
use crate::isa::registers::RegUnit;
use crate::regalloc::api::RaFunction;
use crate::regalloc::context::RegallocResult;
use crate::result::CodegenResult;

/// The finished form of a compiled function: machine code plus the side tables a linker or
/// JIT loader needs (SPEC_FULL.md section 6, "Output from the core").
pub struct FinalizedFunction {
    /// The function's native code.
    pub code: std::vec::Vec<u8>,
    /// Call-site relocations (PC -> callee function index).
    pub relocs: std::vec::Vec<RelocationSite>,
    /// Trap sites (PC -> trap code), for mapping a runtime trap back to a cause.
    pub traps: std::vec::Vec<TrapSite>,
    /// Total stack frame size in bytes, 16-byte aligned.
    pub frame_size: u32,
}

/// Frame layout, computed once register allocation has reported its clobbered-register set
/// and spill area size.
struct FrameLayout {
    /// Callee-saved GPRs the allocator clobbered, in push order.
    callee_saved_gpr: std::vec::Vec<RegUnit>,
    /// Callee-saved FPRs the allocator clobbered, in push order.
    callee_saved_fpr: std::vec::Vec<RegUnit>,
    /// Byte offset of each spill slot from the base of the spill area, indexed by
    /// `SpillSlot`; each slot is naturally aligned to its own width (4, 8, or 16 bytes) so a
    /// narrower slot spilled around one call never overlaps a wider one spilled around
    /// another.
    spill_offsets: std::vec::Vec<u32>,
    spill_size: u32,
    outgoing_arg_bytes: u32,
}

impl FrameLayout {
    fn new(result: &RegallocResult, outgoing_arg_bytes: u32) -> Self {
        use crate::isa::aarch64::registers::FPR_FIRST_UNIT;
        let mut callee_saved_gpr = std::vec::Vec::new();
        let mut callee_saved_fpr = std::vec::Vec::new();
        for &unit in &result.clobbered_callee_saved {
            if unit < FPR_FIRST_UNIT {
                callee_saved_gpr.push(unit);
            } else {
                callee_saved_fpr.push(unit);
            }
        }
        callee_saved_gpr.sort_unstable();
        callee_saved_fpr.sort_unstable();

        let mut cursor = 0u32;
        let mut spill_offsets = std::vec::Vec::with_capacity(result.spill_slot_widths.len());
        for (_, &width) in result.spill_slot_widths.iter() {
            cursor = align_up(cursor, width);
            spill_offsets.push(cursor);
            cursor += width;
        }

        Self {
            callee_saved_gpr,
            callee_saved_fpr,
            spill_size: round_up_16(cursor),
            outgoing_arg_bytes: round_up_16(outgoing_arg_bytes),
            spill_offsets,
        }
    }

    /// Stack bytes used by the return-address slot plus every callee-saved save slot, each
    /// its own 16-byte slot (SPEC_FULL.md section 4.5, "Prologue/epilogue synthesis").
    fn prologue_stack_bytes(&self) -> u32 {
        16 * (1 + self.callee_saved_gpr.len() as u32 + self.callee_saved_fpr.len() as u32)
    }

    /// Code bytes the prologue (equivalently, one epilogue instance) contributes: one 4-byte
    /// push/pop instruction per saved register, plus one `sub`/`add sp` if the frame has a
    /// spill or outgoing-argument area.
    fn prologue_code_bytes(&self) -> u32 {
        let pushes = 1 + self.callee_saved_gpr.len() as u32 + self.callee_saved_fpr.len() as u32;
        let sp_adjust = u32::from(self.spill_size + self.outgoing_arg_bytes > 0);
        4 * (pushes + sp_adjust)
    }

    fn frame_size(&self) -> u32 {
        self.prologue_stack_bytes() + self.spill_size + self.outgoing_arg_bytes
    }

    fn resolve_frame_slot(&self, slot: FrameSlot) -> i32 {
        match slot {
            FrameSlot::IncomingArg(k) => (self.frame_size() + k) as i32,
            FrameSlot::OutgoingRet(k) => (self.frame_size() + k) as i32,
            FrameSlot::Spill(s) => {
                let offset = self.spill_offsets[s.index()];
                (self.outgoing_arg_bytes + offset) as i32
            }
            FrameSlot::CalleeSave(k) => (self.outgoing_arg_bytes + self.spill_size + k * 16) as i32,
        }
    }
}

fn round_up_16(n: u32) -> u32 {
    (n + 15) & !15
}

fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) & !(align - 1)
}

/// Run the finalize/encode stage over a register-allocated function.
pub fn finalize(func: &LoweredFunction, regalloc: &RegallocResult, outgoing_arg_bytes: u32) -> CodegenResult<FinalizedFunction> {
    let frame = FrameLayout::new(regalloc, outgoing_arg_bytes);

    let order = func.blocks_rpo();
    let mut block_offsets: HashMap<Ebb, CodeOffset> = HashMap::new();
    let mut cursor: CodeOffset = frame.prologue_code_bytes();
    for &block in &order {
        block_offsets.insert(block, cursor);
        for inst in func.block_insts(block) {
            if matches!(inst, Inst::Ret { .. }) {
                cursor += frame.prologue_code_bytes();
            }
            cursor += emit::size_in_bytes(inst);
        }
    }

    let mut buf = CodeBuffer::new();
    emit_prologue(&mut buf, &frame);

    let resolve_block = |ebb: Ebb| *block_offsets.get(&ebb).expect("every branch target was visited by the layout pass");
    let resolve_frame = |slot: FrameSlot| frame.resolve_frame_slot(slot);

    for &block in &order {
        for inst in func.block_insts(block) {
            if matches!(inst, Inst::Ret { .. }) {
                emit_epilogue(&mut buf, &frame);
            }
            emit::encode(inst, buf.offset(), &resolve_block, &resolve_frame, &mut buf)?;
        }
    }

    let (code, relocs, traps) = buf.finish();
    debug!(
        "finalized {} bytes, frame size {}, {} relocations, {} trap sites",
        code.len(),
        frame.frame_size(),
        relocs.len(),
        traps.len()
    );
    Ok(FinalizedFunction {
        code,
        relocs,
        traps,
        frame_size: frame.frame_size(),
    })
}

fn emit_prologue(buf: &mut CodeBuffer, frame: &FrameLayout) {
    use crate::isa::aarch64::registers::LR;
    push_reg(buf, LR, true);
    for &unit in &frame.callee_saved_gpr {
        push_reg(buf, unit, true);
    }
    for &unit in &frame.callee_saved_fpr {
        push_reg(buf, unit, false);
    }
    if frame.spill_size + frame.outgoing_arg_bytes > 0 {
        sub_sp(buf, frame.spill_size + frame.outgoing_arg_bytes);
    }
}

fn emit_epilogue(buf: &mut CodeBuffer, frame: &FrameLayout) {
    if frame.spill_size + frame.outgoing_arg_bytes > 0 {
        add_sp(buf, frame.spill_size + frame.outgoing_arg_bytes);
    }
    for &unit in frame.callee_saved_fpr.iter().rev() {
        pop_reg(buf, unit, false);
    }
    for &unit in frame.callee_saved_gpr.iter().rev() {
        pop_reg(buf, unit, true);
    }
    use crate::isa::aarch64::registers::LR;
    pop_reg(buf, LR, true);
}

/// `str rt, [sp, #-16]!` (pre-indexed push), the prologue's save idiom: each callee-saved
/// register gets its own 16-byte slot (SPEC_FULL.md section 4.5).
fn push_reg(buf: &mut CodeBuffer, unit: RegUnit, is_gpr: bool) {
    let rt = reg_field(unit, is_gpr);
    let opc = if is_gpr { 0b11_111_0_00_00 } else { 0b11_111_1_00_00 };
    buf.put4((opc << 22) | (0x1f0u32 << 10) | (31u32 << 5) | rt);
}

/// `ldr rt, [sp], #16` (post-indexed pop).
fn pop_reg(buf: &mut CodeBuffer, unit: RegUnit, is_gpr: bool) {
    let rt = reg_field(unit, is_gpr);
    let opc = if is_gpr { 0b11_111_0_00_01 } else { 0b11_111_1_00_01 };
    buf.put4((opc << 22) | (0x010u32 << 10) | (31u32 << 5) | rt);
}

fn reg_field(unit: RegUnit, is_gpr: bool) -> u32 {
    use crate::isa::aarch64::registers::{FPR_FIRST_UNIT, GPR_FIRST_UNIT};
    if is_gpr {
        (unit - GPR_FIRST_UNIT) as u32
    } else {
        (unit - FPR_FIRST_UNIT) as u32
    }
}

fn sub_sp(buf: &mut CodeBuffer, bytes: u32) {
    buf.put4(0b1_1_0_100010_0 << 22 | (bytes << 10) | (31u32 << 5) | 31u32);
}

fn add_sp(buf: &mut CodeBuffer, bytes: u32) {
    buf.put4(0b1_0_0_100010_0 << 22 | (bytes << 10) | (31u32 << 5) | 31u32);
}
