//! The control-flow graph, computed from a function's layout and instructions.
//!
//! Grounded on the teacher's `cranelift-codegen::flowgraph`, but keyed with plain
//! `std::collections::{BTreeMap, BTreeSet}` rather than `cranelift-bforest`: the teacher
//! reaches for a B+-tree forest to avoid per-block heap allocation across huge functions with
//! thousands of blocks, an optimization this crate's scope (single WebAssembly function
//! bodies, not whole-program analysis) doesn't need. See DESIGN.md for the dependency note.

use std::collections::{BTreeMap, BTreeSet};

use waot_entity::SecondaryMap;

use crate::ir::{Ebb, Function, Inst};

/// A basic block, from the point of view of one of its predecessors: the block that
/// branches, plus the specific branch instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BasicBlock {
    /// The predecessor block.
    pub ebb: Ebb,
    /// The branch instruction in `ebb` that targets the successor.
    pub inst: Inst,
}

#[derive(Clone, Default)]
struct CfgNode {
    predecessors: BTreeMap<Inst, Ebb>,
    successors: BTreeSet<Ebb>,
}

/// The control-flow graph of a function: predecessors and successors of every block.
#[derive(Clone, Default)]
pub struct ControlFlowGraph {
    data: SecondaryMap<Ebb, CfgNode>,
    valid: bool,
}

impl ControlFlowGraph {
    /// An empty, invalid graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for `func` from scratch.
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    /// Recompute the graph for `func` from scratch, discarding any previous content.
    pub fn compute(&mut self, func: &Function) {
        self.clear();
        for ebb in func.layout.ebbs() {
            self.compute_ebb(func, ebb);
        }
        self.valid = true;
    }

    fn compute_ebb(&mut self, func: &Function, ebb: Ebb) {
        for inst in func.layout.ebb_insts(ebb) {
            if let Some(dest) = func.dfg.inst_data(inst).branch_destination() {
                self.add_edge(ebb, inst, dest);
            }
        }
    }

    /// Clear all data, keeping storage capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.valid = false;
    }

    /// Record an edge `ebb --inst--> dest`.
    pub fn add_edge(&mut self, ebb: Ebb, inst: Inst, dest: Ebb) {
        self.data[ebb].successors.insert(dest);
        self.data[dest].predecessors.insert(inst, ebb);
    }

    /// Has `compute` been run since the last `clear`?
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Iterate over the predecessors of `ebb`.
    pub fn pred_iter(&self, ebb: Ebb) -> impl Iterator<Item = BasicBlock> + '_ {
        self.data[ebb]
            .predecessors
            .iter()
            .map(|(&inst, &ebb)| BasicBlock { ebb, inst })
    }

    /// Iterate over the successors of `ebb`.
    pub fn succ_iter(&self, ebb: Ebb) -> impl Iterator<Item = Ebb> + '_ {
        self.data[ebb].successors.iter().copied()
    }

    /// Number of distinct predecessor edges into `ebb`.
    pub fn pred_count(&self, ebb: Ebb) -> usize {
        self.data[ebb].predecessors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{Cursor, FuncCursor};
    use crate::ir::{BlockCall, Function, InstructionData, Opcode, Value};
    use waot_entity::EntityRef;

    #[test]
    fn branches_and_jumps() {
        let mut func = Function::new();
        let ebb0 = func.dfg.make_ebb();
        let ebb1 = func.dfg.make_ebb();
        let ebb2 = func.dfg.make_ebb();
        func.layout.append_ebb(ebb0);
        func.layout.append_ebb(ebb1);
        func.layout.append_ebb(ebb2);

        let cond = Value::new(0);
        {
            let mut pos = FuncCursor::new(&mut func);
            pos.at_bottom(ebb0);
            let br = pos.func_mut().dfg.make_inst(InstructionData::Branch {
                opcode: Opcode::Brnz,
                cond,
                call: BlockCall {
                    dest: ebb1,
                    args: std::vec::Vec::new(),
                },
            });
            pos.insert_inst(br);

            pos.at_bottom(ebb1);
            let jmp = pos.func_mut().dfg.make_inst(InstructionData::Jump {
                call: BlockCall {
                    dest: ebb2,
                    args: std::vec::Vec::new(),
                },
            });
            pos.insert_inst(jmp);
        }

        let cfg = ControlFlowGraph::with_function(&func);
        assert_eq!(cfg.pred_count(ebb1), 1);
        assert_eq!(cfg.succ_iter(ebb0).collect::<std::vec::Vec<_>>(), [ebb1]);
        assert_eq!(cfg.succ_iter(ebb1).collect::<std::vec::Vec<_>>(), [ebb2]);
        assert_eq!(cfg.pred_count(ebb2), 1);
    }
}
