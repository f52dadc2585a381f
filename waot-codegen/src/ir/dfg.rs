//! The data-flow graph: owns every value definition and instruction in a function.

use waot_entity::{PrimaryMap, SecondaryMap};

use crate::ir::entities::{Ebb, FuncRef, Inst, JumpTable, SigRef, Value};
use crate::ir::extfunc::{ExtFuncData, Signature};
use crate::ir::instructions::{InstructionData, JumpTableData};
use crate::ir::types::Type;

/// What defines a `Value`: either the Nth result of an instruction, or the Nth formal
/// parameter of a block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueDef {
    /// Result number `num` of `inst`.
    Result(Inst, usize),
    /// Parameter number `num` of `ebb`.
    Param(Ebb, usize),
}

#[derive(Clone, Debug)]
struct ValueData {
    ty: Type,
    def: ValueDef,
}

#[derive(Clone, Debug, Default)]
struct EbbData {
    params: std::vec::Vec<Value>,
}

/// Owns all the blocks, instructions, values, and auxiliary tables (signatures, external
/// function references, jump tables) that make up a function's body.
#[derive(Clone, Default)]
pub struct DataFlowGraph {
    ebbs: PrimaryMap<Ebb, EbbData>,
    values: PrimaryMap<Value, ValueData>,
    insts: PrimaryMap<Inst, InstructionData>,
    results: SecondaryMap<Inst, std::vec::Vec<Value>>,
    /// Signatures of indirectly-called functions.
    pub signatures: PrimaryMap<SigRef, Signature>,
    /// External function references used by direct calls.
    pub ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,
    /// Jump tables used by `br_table`.
    pub jump_tables: PrimaryMap<JumpTable, JumpTableData>,
}

impl DataFlowGraph {
    /// An empty data-flow graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data, keeping storage capacity.
    pub fn clear(&mut self) {
        self.ebbs.clear();
        self.values.clear();
        self.insts.clear();
        self.results.clear();
        self.signatures.clear();
        self.ext_funcs.clear();
        self.jump_tables.clear();
    }

    /// Create a new, empty basic block.
    pub fn make_ebb(&mut self) -> Ebb {
        self.ebbs.push(EbbData::default())
    }

    /// Append a new instruction with no results yet attached.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        self.insts.push(data)
    }

    /// The `InstructionData` for `inst`.
    pub fn inst_data(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    /// Mutable access to the `InstructionData` for `inst`.
    pub fn inst_data_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }

    /// Append a new result value of type `ty` to `inst`, returning the new value.
    pub fn append_result(&mut self, inst: Inst, ty: Type) -> Value {
        let num = self.results[inst].len();
        let v = self.values.push(ValueData {
            ty,
            def: ValueDef::Result(inst, num),
        });
        self.results[inst].push(v);
        v
    }

    /// The results produced by `inst`.
    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        &self.results[inst]
    }

    /// The first (and usually only) result produced by `inst`.
    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst][0]
    }

    /// Append a formal parameter of type `ty` to `ebb`, returning the new value.
    pub fn append_ebb_param(&mut self, ebb: Ebb, ty: Type) -> Value {
        let num = self.ebbs[ebb].params.len();
        let v = self.values.push(ValueData {
            ty,
            def: ValueDef::Param(ebb, num),
        });
        self.ebbs[ebb].params.push(v);
        v
    }

    /// The formal parameters of `ebb`, in order.
    pub fn ebb_params(&self, ebb: Ebb) -> &[Value] {
        &self.ebbs[ebb].params
    }

    /// Remove a formal parameter of `ebb` (used when trivial-phi elimination determines a
    /// placeholder parameter was never needed).
    pub fn remove_ebb_param(&mut self, ebb: Ebb, value: Value) {
        self.ebbs[ebb].params.retain(|&v| v != value);
    }

    /// The type of `v`.
    pub fn value_type(&self, v: Value) -> Type {
        self.values[v].ty
    }

    /// What defines `v`.
    pub fn value_def(&self, v: Value) -> ValueDef {
        self.values[v].def
    }

    /// Replace every use of `before.args`/operands referencing `from` with `to` within the
    /// given instruction's argument list. Used by trivial-phi elimination, which must
    /// rewrite every user of an eliminated block parameter to reference its sole definition
    /// directly instead.
    pub fn replace_value_in_inst(&mut self, inst: Inst, from: Value, to: Value) {
        replace_in_instruction_data(&mut self.insts[inst], from, to);
    }

    /// Replace `from` with `to` in every branch argument list targeting `ebb`'s parameter
    /// list position (used when a block parameter is eliminated: every predecessor's branch
    /// argument for that slot must drop out along with it). Handled at a higher level by the
    /// SSA builder; this helper only rewrites a single `BlockCall`'s argument vector.
    pub fn replace_value_everywhere(&mut self, insts: &[Inst], from: Value, to: Value) {
        for &inst in insts {
            self.replace_value_in_inst(inst, from, to);
        }
    }
}

fn replace_in_instruction_data(data: &mut InstructionData, from: Value, to: Value) {
    use crate::ir::instructions::InstructionData::*;
    let fix = |v: &mut Value| {
        if *v == from {
            *v = to;
        }
    };
    match data {
        Unary { arg, .. } => fix(arg),
        Binary { args, .. } => args.iter_mut().for_each(fix),
        MemOp { arg, base, .. } => {
            fix(arg);
            fix(base);
        }
        Call { args, .. } => args.iter_mut().for_each(fix),
        CallIndirect {
            table_index_arg,
            args,
            ..
        } => {
            fix(table_index_arg);
            args.iter_mut().for_each(fix);
        }
        Jump { call } => call.args.iter_mut().for_each(fix),
        Branch { cond, call, .. } => {
            fix(cond);
            call.args.iter_mut().for_each(fix);
        }
        BranchTable { cond, .. } => fix(cond),
        Return { args } => args.iter_mut().for_each(fix),
        Trap { cond: Some(c), .. } => fix(c),
        Trap { cond: None, .. } | UnaryImm { .. } | UnaryIeee { .. } => {}
    }
}
