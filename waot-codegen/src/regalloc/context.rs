//! The register allocation driver.
//!
//! Grounded on the shape of the teacher's `cranelift-codegen::regalloc::context::Context` (a
//! persistent, reusable driver object with a single `run` entry point) but implementing the
//! simplified greedy algorithm SPEC_FULL.md section 4.4 specifies instead of the teacher's
//! full coalescing/spilling/reload/coloring pipeline: liveness to a fixed point, then one
//! linear scan per block that colors values into free registers, prefers to keep a copy's
//! destination in its source's register, and spills anything live across a call that
//! currently occupies a caller-saved unit.

use std::collections::HashMap;

use log::{debug, trace};
use waot_entity::PrimaryMap;

use crate::regalloc::api::{RaFunction, RaInst, VReg};
use crate::regalloc::liveness::Liveness;
use crate::regalloc::register_set::RegisterSet;
use crate::regalloc::value_loc::ValueLoc;
use crate::regalloc::vreg::SpillSlot;
use crate::isa::registers::RegUnit;
use crate::result::{CodegenError, CodegenResult};

/// The outcome of allocating registers for one function.
pub struct RegallocResult {
    /// Final location of every vreg that was ever defined.
    pub locations: HashMap<VReg, ValueLoc>,
    /// Callee-saved register units touched by the allocation; the prologue/epilogue must
    /// save and restore exactly this set.
    pub clobbered_callee_saved: std::vec::Vec<RegUnit>,
    /// Total spill-slot area size in bytes, unaligned (the machine rounds up to 16 bytes).
    pub spill_slot_size: u32,
    /// Width in bytes (4, 8, or 16) of each spill slot the allocator handed out, indexed by
    /// `SpillSlot`, so finalize can lay out mixed-width slots without assuming a uniform
    /// stride.
    pub spill_slot_widths: PrimaryMap<SpillSlot, u32>,
}

/// Persistent memory for register allocation, reusable across functions.
pub struct Context {
    spill_slots: PrimaryMap<SpillSlot, u32>,
}

impl Context {
    /// A fresh, empty context.
    pub fn new() -> Self {
        Self {
            spill_slots: PrimaryMap::new(),
        }
    }

    /// Clear all data, keeping storage capacity, ready for the next function.
    pub fn clear(&mut self) {
        self.spill_slots.clear();
    }

    /// Allocate registers for `func`.
    ///
    /// `usable` is the register set available to the allocator (callee/caller-saved GPRs and
    /// FPRs, minus any unit reserved by the ABI: stack pointer, frame pointer, link register,
    /// the execution-context and module-instance pointer registers). `is_caller_saved`
    /// classifies a unit as caller-saved (must be spilled across a call) versus callee-saved
    /// (the prologue/epilogue preserves it, so nothing needs spilling across a call).
    pub fn run<F: RaFunction>(
        &mut self,
        func: &mut F,
        usable: &RegisterSet,
        is_caller_saved: impl Fn(RegUnit) -> bool,
    ) -> CodegenResult<RegallocResult> {
        self.spill_slots.clear();
        debug!("regalloc: allocating {} blocks", func.blocks_rpo().len());

        let liveness = Liveness::compute(func);
        let mut free = usable.clone();
        let mut assigned: HashMap<VReg, RegUnit> = HashMap::new();
        let mut locations: HashMap<VReg, ValueLoc> = HashMap::new();
        let mut vreg_slots: HashMap<VReg, SpillSlot> = HashMap::new();
        let mut clobbered = std::vec::Vec::new();

        for block in func.blocks_rpo() {
            // Instructions the allocator splices in (spill stores/reloads) shift every
            // index after the splice point. `shift` tracks how far the original `idx`-th
            // instruction has moved so liveness queries and mutating hooks keep addressing
            // the same logical instruction the outer loop bound (`n`) was computed against.
            let n = func.block_insts(block).len();
            let mut shift: usize = 0;
            for idx in 0..n {
                let real_idx = idx + shift;
                let inst_is_call = func.block_insts(block)[real_idx].is_call();

                if inst_is_call {
                    let live_caller_saved: std::vec::Vec<(VReg, RegUnit)> = assigned
                        .iter()
                        .filter(|&(&vreg, &unit)| {
                            is_caller_saved(unit) && liveness.live_after(func, block, real_idx, vreg)
                        })
                        .map(|(&v, &u)| (v, u))
                        .collect();

                    let mut call_idx = real_idx;
                    for (vreg, unit) in live_caller_saved {
                        let slot = *vreg_slots.entry(vreg).or_insert_with(|| {
                            let bytes = func.vreg_bytes(vreg);
                            self.spill_slots.push(bytes)
                        });
                        trace!("spilling caller-saved {:?} (unit {}) around call at inst {}", vreg, unit, real_idx);
                        func.store_register_before(vreg, block, call_idx, slot);
                        call_idx += 1;
                        shift += 1;
                        free.free(unit);
                        assigned.remove(&vreg);
                        locations.insert(vreg, ValueLoc::Stack(slot));

                        let rc = func.vreg_class(vreg);
                        let new_unit = free
                            .alloc_first(rc)
                            .ok_or_else(|| CodegenError::bug("no free register to reload into"))?;
                        func.reload_register_after(vreg, block, call_idx, slot);
                        shift += 1;
                        assigned.insert(vreg, new_unit);
                        locations.insert(vreg, ValueLoc::Reg(new_unit));
                        if !is_caller_saved(new_unit) {
                            clobbered.push(new_unit);
                        }
                    }
                }

                let real_idx = idx + shift;
                let insts_snapshot = func.block_insts(block);
                let uses = insts_snapshot[real_idx].uses();
                let defs = insts_snapshot[real_idx].defs();
                let is_copy = insts_snapshot[real_idx].is_copy();
                let copy_source = insts_snapshot[real_idx].uses().first().copied();

                for vreg in uses {
                    if let Some(&unit) = assigned.get(&vreg) {
                        func.assign_use(block, real_idx, vreg, unit);
                        if !liveness.live_after(func, block, real_idx, vreg) {
                            free.free(unit);
                            assigned.remove(&vreg);
                        }
                    }
                }

                let copy_src_unit = if is_copy {
                    copy_source.and_then(|u| assigned.get(&u)).copied()
                } else {
                    None
                };

                for vreg in defs {
                    let rc = func.vreg_class(vreg);
                    let unit = match copy_src_unit {
                        Some(u) if rc.contains(u) && free.is_avail(u) => {
                            free.take(u);
                            u
                        }
                        _ => free
                            .alloc_first(rc)
                            .ok_or_else(|| CodegenError::bug("register allocator ran out of registers"))?,
                    };
                    func.assign_def(block, real_idx, vreg, unit);
                    assigned.insert(vreg, unit);
                    locations.insert(vreg, ValueLoc::Reg(unit));
                    if !is_caller_saved(unit) && !clobbered.contains(&unit) {
                        clobbered.push(unit);
                    }
                    if !liveness.live_after(func, block, real_idx, vreg) {
                        free.free(unit);
                        assigned.remove(&vreg);
                    }
                }
            }
        }

        let spill_slot_size = self.spill_slots.values().sum();
        Ok(RegallocResult {
            locations,
            clobbered_callee_saved: clobbered,
            spill_slot_size,
            spill_slot_widths: self.spill_slots.clone(),
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
