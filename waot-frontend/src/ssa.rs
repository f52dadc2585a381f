//! On-the-fly SSA construction (Braun, Buchwald, Hack, Leissa, Mallon, Zwinkau, CC 2013),
//! used by `FunctionBuilder` to resolve a local variable's current value while translating
//! a WebAssembly function body one instruction at a time, without ever building a CFG or
//! computing dominance up front.
//!
//! A block may be sealed (all its predecessors are known) or unsealed. Reading a variable
//! in an unsealed block creates a block parameter whose operand list is left incomplete;
//! `seal_block` fills in that operand list by querying each predecessor, patching the
//! predecessor's own outgoing branch to pass the resolved value. This crate's predecessor
//! list per block is built incrementally by the caller via `declare_ebb_predecessor`, since
//! the full control-flow graph is not known until the function is completely translated.
//!
//! A block parameter created this way is collapsed again, right after its operand list is
//! filled in, if every incoming edge turns out to agree on one value (ignoring the
//! parameter feeding back into itself, the loop-carried-invariant case): `try_remove_trivial_phi`
//! drops the parameter, drops the matching argument from every predecessor's branch, and
//! rewrites every existing use of the parameter to the agreed-on value directly, via
//! `ir::dfg`'s `remove_ebb_param`/`replace_value_everywhere`.

use std::collections::HashMap;

use waot_codegen::cursor::{Cursor, FuncCursor};
use waot_codegen::ir::{BlockCall, Ebb, Function, Inst, InstructionData, Type, Value};
use waot_entity::{entity_impl, EntityRef};

/// A source-level local: a wasm local slot, parameter, or `FunctionBuilder`-declared
/// temporary the SSA builder promotes straight to SSA values instead of a stack slot.
#[derive(Copy, Clone)]
pub struct Variable(u32);
entity_impl!(Variable, "var");

#[derive(Default)]
struct BlockData {
    sealed: bool,
    /// Block parameters created to stand in for a variable read before this block was
    /// sealed, with the variable they stand for. Filled in by `seal_block`.
    incomplete_params: std::vec::Vec<(Variable, Value)>,
    /// `(predecessor, branch instruction in that predecessor that targets this block)`.
    preds: std::vec::Vec<(Ebb, Inst)>,
}

/// Tracks, per block, the current SSA value of every variable, and drives Braun et al.'s
/// algorithm for the blocks that are not yet sealed.
#[derive(Default)]
pub struct SSABuilder {
    blocks: HashMap<Ebb, BlockData>,
    defs: HashMap<(Ebb, Variable), Value>,
}

impl SSABuilder {
    /// A fresh builder with no blocks declared yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called once for every block before it is read from or sealed.
    pub fn declare_ebb(&mut self, ebb: Ebb) {
        self.blocks.entry(ebb).or_insert_with(BlockData::default);
    }

    /// Record that `branch`, an instruction in `pred`, is a control-flow edge into `ebb`.
    /// Must be declared before `ebb` is sealed.
    pub fn declare_ebb_predecessor(&mut self, ebb: Ebb, pred: Ebb, branch: Inst) {
        self.block_mut(ebb).preds.push((pred, branch));
    }

    /// Record `val` as the current definition of `var` in `ebb`, without going through
    /// control-flow resolution (used by the `FunctionBuilder` for a direct assignment).
    pub fn def_var(&mut self, var: Variable, ebb: Ebb, val: Value) {
        self.defs.insert((ebb, var), val);
    }

    /// Resolve the current value of `var` as observed at the end of `ebb`, creating block
    /// parameters and recursing into predecessors as needed.
    pub fn use_var(&mut self, func: &mut Function, var: Variable, ty: Type, ebb: Ebb) -> Value {
        if let Some(&val) = self.defs.get(&(ebb, var)) {
            return val;
        }
        let val = self.use_var_slow(func, var, ty, ebb);
        self.defs.insert((ebb, var), val);
        val
    }

    fn use_var_slow(&mut self, func: &mut Function, var: Variable, ty: Type, ebb: Ebb) -> Value {
        if !self.block(ebb).sealed {
            // Predecessors aren't all known yet: create a block parameter and leave its
            // operand list to be filled in once `seal_block` runs.
            let val = func.dfg.append_ebb_param(ebb, ty);
            self.block_mut(ebb).incomplete_params.push((var, val));
            return val;
        }

        let preds = self.block(ebb).preds.clone();
        match preds.as_slice() {
            [] => {
                // No predecessors and no existing definition: the variable was never
                // initialized on any reachable path into this block. The translator is
                // responsible for predefining every wasm local at the entry block, so
                // reaching this is a bug in the caller, not a malformed program; fall back
                // to a fresh, unconnected block parameter rather than panicking so a single
                // bad call site doesn't take down the whole translation.
                func.dfg.append_ebb_param(ebb, ty)
            }
            [(pred, _)] => {
                // Exactly one predecessor: no ambiguity, so no block parameter is needed.
                let pred = *pred;
                self.use_var(func, var, ty, pred)
            }
            _ => {
                // Multiple predecessors: the value may differ depending on which edge was
                // taken, so a block parameter (phi) is unavoidable. Append it and
                // immediately record it as this block's definition so a predecessor whose
                // own resolution loops back here (a loop backedge) sees this value instead
                // of recursing forever.
                let val = func.dfg.append_ebb_param(ebb, ty);
                self.defs.insert((ebb, var), val);
                let mut operands = std::vec::Vec::with_capacity(preds.len());
                for (pred, branch) in preds {
                    let pred_val = self.use_var(func, var, ty, pred);
                    append_branch_arg(func, branch, pred_val);
                    operands.push(pred_val);
                }
                self.try_remove_trivial_phi(func, ebb, val, &operands);
                *self.defs.get(&(ebb, var)).expect("just inserted above")
            }
        }
    }

    /// Mark `ebb` as sealed: every predecessor has now been declared. Fills in the operand
    /// list of every block parameter this builder created speculatively while `ebb` was
    /// unsealed.
    pub fn seal_block(&mut self, func: &mut Function, ebb: Ebb) {
        let incomplete = std::mem::take(&mut self.block_mut(ebb).incomplete_params);
        let preds = self.block(ebb).preds.clone();
        for (var, val) in incomplete {
            let ty = func.dfg.value_type(val);
            let mut operands = std::vec::Vec::with_capacity(preds.len());
            for &(pred, branch) in &preds {
                let pred_val = self.use_var(func, var, ty, pred);
                append_branch_arg(func, branch, pred_val);
                operands.push(pred_val);
            }
            // The parameter itself is already in `defs` as the resolved value for this
            // (var, ebb) pair: it was returned by `use_var_slow` before sealing, and
            // `use_var` memoized it there unconditionally. `try_remove_trivial_phi` updates
            // that memoized entry in place if every operand turns out to agree.
            self.try_remove_trivial_phi(func, ebb, val, &operands);
        }
        self.block_mut(ebb).sealed = true;
    }

    /// If every operand agrees on one value (ignoring `param` itself, which only appears via
    /// a loop backedge that hasn't added any information), `param` was a placeholder rather
    /// than a real merge point: drop it from `ebb`, drop the matching argument from every
    /// predecessor's branch, and repoint every existing use of `param` to the agreed value.
    fn try_remove_trivial_phi(&mut self, func: &mut Function, ebb: Ebb, param: Value, operands: &[Value]) {
        let mut same: Option<Value> = None;
        for &op in operands {
            if op == param || Some(op) == same {
                continue;
            }
            if same.is_some() {
                return; // genuinely ambiguous: keep the parameter.
            }
            same = Some(op);
        }
        let same = match same {
            Some(v) => v,
            None => return, // only self-references: an unreachable block, leave it alone.
        };

        let index = match func.dfg.ebb_params(ebb).iter().position(|&v| v == param) {
            Some(i) => i,
            None => return, // already collapsed by an earlier call.
        };
        let preds = self.block(ebb).preds.clone();
        for &(_, branch) in &preds {
            remove_branch_arg(func, branch, index);
        }
        func.dfg.remove_ebb_param(ebb, param);

        for v in self.defs.values_mut() {
            if *v == param {
                *v = same;
            }
        }
        replace_value_everywhere_in(func, param, same);
    }

    /// Retarget a previously declared predecessor edge: `branch` (in `pred`) used to jump to
    /// `old_dest` and now jumps to `new_dest` instead. Used when an `if`'s `brz` is
    /// discovered to need an `else` block spliced between it and the merge block.
    pub fn change_ebb_predecessor(&mut self, old_dest: Ebb, new_dest: Ebb, pred: Ebb, branch: Inst) {
        self.block_mut(old_dest)
            .preds
            .retain(|&(p, i)| !(p == pred && i == branch));
        self.declare_ebb_predecessor(new_dest, pred, branch);
    }

    /// Seal every block that was declared but not yet sealed, in declaration order. Used
    /// once a function's whole body has been translated and no further predecessors can
    /// appear (SPEC_FULL.md's "finish building a function" step).
    pub fn seal_all_blocks(&mut self, func: &mut Function, order: &[Ebb]) {
        for &ebb in order {
            if !self.block(ebb).sealed {
                self.seal_block(func, ebb);
            }
        }
    }

    /// Whether `ebb` has been sealed.
    pub fn is_sealed(&self, ebb: Ebb) -> bool {
        self.block(ebb).sealed
    }

    fn block(&self, ebb: Ebb) -> &BlockData {
        self.blocks
            .get(&ebb)
            .expect("ebb used before declare_ebb was called")
    }

    fn block_mut(&mut self, ebb: Ebb) -> &mut BlockData {
        self.blocks
            .get_mut(&ebb)
            .expect("ebb used before declare_ebb was called")
    }
}

/// Append `val` to the argument list of the `BlockCall` carried by `branch` (a `Jump` or
/// `Branch` instruction). Used both when sealing a block and when eagerly wiring a
/// multi-predecessor phi's operands.
fn append_branch_arg(func: &mut Function, branch: Inst, val: Value) {
    match func.dfg.inst_data_mut(branch) {
        InstructionData::Jump { call } => call.args.push(val),
        InstructionData::Branch { call, .. } => call.args.push(val),
        other => panic!("{:?} is not a branch instruction", other),
    }
}

/// Drop the argument at `index` from `branch`'s outgoing argument list, used when trivial-phi
/// elimination removes the block parameter that argument was feeding.
fn remove_branch_arg(func: &mut Function, branch: Inst, index: usize) {
    match func.dfg.inst_data_mut(branch) {
        InstructionData::Jump { call } => {
            call.args.remove(index);
        }
        InstructionData::Branch { call, .. } => {
            call.args.remove(index);
        }
        other => panic!("{:?} is not a branch instruction", other),
    }
}

/// Rewrite every use of `from` to `to` across the whole function, used when trivial-phi
/// elimination retires a value that earlier instructions may already reference.
fn replace_value_everywhere_in(func: &mut Function, from: Value, to: Value) {
    let insts: std::vec::Vec<Inst> = func
        .layout
        .ebbs()
        .flat_map(|ebb| func.layout.ebb_insts(ebb).collect::<std::vec::Vec<_>>())
        .collect();
    func.dfg.replace_value_everywhere(&insts, from, to);
}

/// Build a fresh, empty `BlockCall` targeting `ebb` with no arguments yet; the SSA builder
/// fills in the argument list later as predecessors are resolved and sealed.
pub fn empty_block_call(ebb: Ebb) -> BlockCall {
    BlockCall {
        dest: ebb,
        args: std::vec::Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waot_codegen::ir::Opcode;

    fn append_jump(func: &mut Function, from: Ebb, to: Ebb) -> Inst {
        let mut pos = FuncCursor::new(func);
        pos.at_bottom(from);
        let jmp = pos.func_mut().dfg.make_inst(InstructionData::Jump {
            call: empty_block_call(to),
        });
        pos.insert_inst(jmp);
        jmp
    }

    #[test]
    fn single_predecessor_needs_no_phi() {
        let mut func = Function::new();
        let ebb0 = func.dfg.make_ebb();
        let ebb1 = func.dfg.make_ebb();
        func.layout.append_ebb(ebb0);
        func.layout.append_ebb(ebb1);

        let mut pos = FuncCursor::new(&mut func);
        pos.at_bottom(ebb0);
        let iconst = pos.func_mut().dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 7,
        });
        pos.insert_inst(iconst);
        let v0 = pos.func_mut().dfg.append_result(iconst, Type::I32);

        let mut ssa = SSABuilder::new();
        ssa.declare_ebb(ebb0);
        ssa.declare_ebb(ebb1);
        let var = Variable::new(0);
        ssa.def_var(var, ebb0, v0);

        let jmp = append_jump(&mut func, ebb0, ebb1);
        ssa.declare_ebb_predecessor(ebb1, ebb0, jmp);
        ssa.seal_block(&mut func, ebb0);
        ssa.seal_block(&mut func, ebb1);

        let resolved = ssa.use_var(&mut func, var, Type::I32, ebb1);
        assert_eq!(resolved, v0);
        assert!(func.dfg.ebb_params(ebb1).is_empty());
    }

    #[test]
    fn diamond_merge_creates_phi() {
        let mut func = Function::new();
        let entry = func.dfg.make_ebb();
        let left = func.dfg.make_ebb();
        let right = func.dfg.make_ebb();
        let merge = func.dfg.make_ebb();
        func.layout.append_ebb(entry);
        func.layout.append_ebb(left);
        func.layout.append_ebb(right);
        func.layout.append_ebb(merge);

        let mut ssa = SSABuilder::new();
        for ebb in [entry, left, right, merge] {
            ssa.declare_ebb(ebb);
        }
        let var = Variable::new(0);

        let mut pos = FuncCursor::new(&mut func);
        pos.at_bottom(left);
        let lc = pos.func_mut().dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 1,
        });
        pos.insert_inst(lc);
        let v_left = pos.func_mut().dfg.append_result(lc, Type::I32);
        ssa.def_var(var, left, v_left);

        pos.at_bottom(right);
        let rc = pos.func_mut().dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 2,
        });
        pos.insert_inst(rc);
        let v_right = pos.func_mut().dfg.append_result(rc, Type::I32);
        ssa.def_var(var, right, v_right);
        drop(pos);

        let jl = append_jump(&mut func, left, merge);
        let jr = append_jump(&mut func, right, merge);
        ssa.declare_ebb_predecessor(merge, left, jl);
        ssa.declare_ebb_predecessor(merge, right, jr);

        ssa.seal_block(&mut func, entry);
        ssa.seal_block(&mut func, left);
        ssa.seal_block(&mut func, right);
        ssa.seal_block(&mut func, merge);

        let resolved = ssa.use_var(&mut func, var, Type::I32, merge);
        assert_eq!(func.dfg.ebb_params(merge).len(), 1);
        assert_eq!(resolved, func.dfg.ebb_params(merge)[0]);

        match func.dfg.inst_data(jl) {
            InstructionData::Jump { call } => assert_eq!(call.args, std::vec![v_left]),
            other => panic!("{:?}", other),
        }
        match func.dfg.inst_data(jr) {
            InstructionData::Jump { call } => assert_eq!(call.args, std::vec![v_right]),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn loop_invariant_header_phi_collapses() {
        let mut func = Function::new();
        let entry = func.dfg.make_ebb();
        let header = func.dfg.make_ebb();
        func.layout.append_ebb(entry);
        func.layout.append_ebb(header);

        let mut ssa = SSABuilder::new();
        ssa.declare_ebb(entry);
        ssa.declare_ebb(header);
        let var = Variable::new(0);

        let mut pos = FuncCursor::new(&mut func);
        pos.at_bottom(entry);
        let ic = pos.func_mut().dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 0,
        });
        pos.insert_inst(ic);
        let v0 = pos.func_mut().dfg.append_result(ic, Type::I32);
        ssa.def_var(var, entry, v0);
        drop(pos);

        let entry_jump = append_jump(&mut func, entry, header);
        ssa.declare_ebb_predecessor(header, entry, entry_jump);
        // Header is not sealed yet: the backedge from itself hasn't been declared.
        let header_val = ssa.use_var(&mut func, var, Type::I32, header);
        assert_eq!(func.dfg.ebb_params(header).len(), 1);

        // The loop body reuses `header_val` unchanged and branches back to `header`: every
        // edge into `header` carries the same value, so the parameter is a placeholder, not
        // a real merge, and sealing should collapse it away.
        let backedge = append_jump(&mut func, header, header);
        ssa.declare_ebb_predecessor(header, header, backedge);
        ssa.def_var(var, header, header_val);

        ssa.seal_block(&mut func, entry);
        ssa.seal_block(&mut func, header);

        assert!(func.dfg.ebb_params(header).is_empty());
        match func.dfg.inst_data(entry_jump) {
            InstructionData::Jump { call } => assert!(call.args.is_empty()),
            other => panic!("{:?}", other),
        }
        match func.dfg.inst_data(backedge) {
            InstructionData::Jump { call } => assert!(call.args.is_empty()),
            other => panic!("{:?}", other),
        }
        assert_eq!(ssa.use_var(&mut func, var, Type::I32, header), v0);
    }

    #[test]
    fn loop_carried_counter_keeps_header_phi() {
        let mut func = Function::new();
        let entry = func.dfg.make_ebb();
        let header = func.dfg.make_ebb();
        func.layout.append_ebb(entry);
        func.layout.append_ebb(header);

        let mut ssa = SSABuilder::new();
        ssa.declare_ebb(entry);
        ssa.declare_ebb(header);
        let var = Variable::new(0);

        let mut pos = FuncCursor::new(&mut func);
        pos.at_bottom(entry);
        let ic = pos.func_mut().dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 0,
        });
        pos.insert_inst(ic);
        let v0 = pos.func_mut().dfg.append_result(ic, Type::I32);
        ssa.def_var(var, entry, v0);
        drop(pos);

        let entry_jump = append_jump(&mut func, entry, header);
        ssa.declare_ebb_predecessor(header, entry, entry_jump);
        let header_val = ssa.use_var(&mut func, var, Type::I32, header);
        assert_eq!(func.dfg.ebb_params(header).len(), 1);

        // The loop body increments the counter before branching back: the backedge carries a
        // different value than the entry edge, so the header phi is genuinely needed.
        pos = FuncCursor::new(&mut func);
        pos.at_bottom(header);
        let one = pos.func_mut().dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 1,
        });
        pos.insert_inst(one);
        let v1 = pos.func_mut().dfg.append_result(one, Type::I32);
        let inc = pos.func_mut().dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [header_val, v1],
        });
        pos.insert_inst(inc);
        let incremented = pos.func_mut().dfg.append_result(inc, Type::I32);
        drop(pos);
        ssa.def_var(var, header, incremented);

        let backedge = append_jump(&mut func, header, header);
        ssa.declare_ebb_predecessor(header, header, backedge);

        ssa.seal_block(&mut func, entry);
        ssa.seal_block(&mut func, header);

        assert_eq!(func.dfg.ebb_params(header).to_vec(), std::vec![header_val]);
        match func.dfg.inst_data(entry_jump) {
            InstructionData::Jump { call } => assert_eq!(call.args, std::vec![v0]),
            other => panic!("{:?}", other),
        }
        match func.dfg.inst_data(backedge) {
            InstructionData::Jump { call } => assert_eq!(call.args, std::vec![incremented]),
            other => panic!("{:?}", other),
        }
    }
}
