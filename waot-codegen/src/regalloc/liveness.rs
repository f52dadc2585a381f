//! Liveness analysis over the pseudo-instruction stream.
//!
//! Grounded on the teacher's `cranelift-codegen::regalloc::liveness`, but a plain fixed-point
//! data-flow solve (live-out of a block = union of live-in of its successors) rather than the
//! teacher's incremental, per-value live range structure: this crate's register allocator is
//! the simplified single-pass design SPEC_FULL.md section 4.4 calls for, not the teacher's
//! coalescing/spilling/reload/coloring pipeline, so there's no need to keep live ranges
//! around after coloring finishes.

use std::collections::{HashMap, HashSet};

use crate::regalloc::api::{RaFunction, RaInst, VReg};

/// Live-in and live-out vreg sets for every block of a function.
pub struct Liveness<F: RaFunction> {
    live_in: HashMap<F::Block, HashSet<VReg>>,
    live_out: HashMap<F::Block, HashSet<VReg>>,
}

impl<F: RaFunction> Liveness<F> {
    /// Solve liveness for `func` to a fixed point.
    pub fn compute(func: &F) -> Self {
        let blocks = func.blocks_rpo();
        let mut live_in: HashMap<F::Block, HashSet<VReg>> =
            blocks.iter().map(|&b| (b, HashSet::new())).collect();
        let mut live_out: HashMap<F::Block, HashSet<VReg>> =
            blocks.iter().map(|&b| (b, HashSet::new())).collect();

        let mut changed = true;
        while changed {
            changed = false;
            for &block in blocks.iter().rev() {
                let mut out = HashSet::new();
                for &succ in func.block_succs(block) {
                    out.extend(live_in[&succ].iter().copied());
                }

                let mut inp = out.clone();
                for inst in func.block_insts(block).iter().rev() {
                    for &d in inst.defs() {
                        inp.remove(&d);
                    }
                    for &u in inst.uses() {
                        inp.insert(u);
                    }
                }
                for &p in func.block_params(block) {
                    inp.remove(&p);
                }

                if out != live_out[&block] {
                    live_out.insert(block, out);
                    changed = true;
                }
                if inp != live_in[&block] {
                    live_in.insert(block, inp);
                    changed = true;
                }
            }
        }

        Self { live_in, live_out }
    }

    /// The vregs live on entry to `block`.
    pub fn live_in(&self, block: F::Block) -> &HashSet<VReg> {
        &self.live_in[&block]
    }

    /// The vregs live on exit from `block`.
    pub fn live_out(&self, block: F::Block) -> &HashSet<VReg> {
        &self.live_out[&block]
    }

    /// Is `vreg` live across the point immediately after instruction `inst_index` in `block`
    /// (i.e. does some later use in this block, or a live-out, depend on it)?
    pub fn live_after(&self, func: &F, block: F::Block, inst_index: usize, vreg: VReg) -> bool {
        let insts = func.block_insts(block);
        if self.live_out(block).contains(&vreg) {
            return true;
        }
        insts[inst_index + 1..]
            .iter()
            .any(|i| i.uses().contains(&vreg) || i.defs().contains(&vreg))
    }
}
