//! A builder for translating a single WebAssembly function body into SSA intermediate
//! representation one opcode at a time, without ever materializing a stack-machine IR.
//!
//! Grounded on the teacher's `cranelift-frontend::frontend::FunctionBuilder`: a
//! `FunctionBuilderContext` that is cleared and reused across functions to amortize
//! allocations, a `FunctionBuilder` borrowing both the context and the `Function` being
//! built, `use_var`/`def_var` as the variable-to-SSA-value bridge backed by `ssa::SSABuilder`,
//! and lazy block insertion (a created block is only spliced into the layout once its first
//! instruction is appended, so an empty unreachable block never litters the function).
//!
//! Simplified from the teacher in one respect: rather than a generated `InstBuilder` trait
//! with one method per opcode (produced there by a meta-crate code generator this project
//! has no equivalent of, since its opcode set is fixed and small), this builder exposes one
//! plain method per `InstructionData` shape directly on `FunctionBuilder`.

use std::collections::HashMap;

use waot_codegen::cursor::{Cursor, FuncCursor};
use waot_codegen::ir::{
    BlockCall, Ebb, FuncRef, Function, InstructionData, JumpTable, Opcode, SigRef, TrapCode, Type,
    Value,
};
use waot_codegen::ir::condcodes::{FloatCC, IntCC};

use crate::ssa::{empty_block_call, SSABuilder, Variable};

/// Reusable scratch state for translating a sequence of functions. Held by the caller and
/// passed to each `FunctionBuilder::new`, so the `HashMap`s backing it are reallocated once
/// rather than once per function.
#[derive(Default)]
pub struct FunctionBuilderContext {
    ssa: SSABuilder,
    ebbs: HashMap<Ebb, EbbData>,
    types: HashMap<Variable, Type>,
}

#[derive(Clone, Copy, Default)]
struct EbbData {
    /// No instruction has been appended to this block yet, so it hasn't been spliced into
    /// the function's layout.
    pristine: bool,
    /// A terminator has been appended; no further instructions may be added.
    filled: bool,
}

impl FunctionBuilderContext {
    /// A context with no blocks or variables declared yet.
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.ssa = SSABuilder::new();
        self.ebbs.clear();
        self.types.clear();
    }
}

/// Builds a single `Function`'s body by appending instructions to whichever block is
/// currently selected with `switch_to_block`.
pub struct FunctionBuilder<'a> {
    /// The function under construction. Public so instruction-insertion helpers defined
    /// outside this module (the wasm translator) can reborrow it directly.
    pub func: &'a mut Function,
    func_ctx: &'a mut FunctionBuilderContext,
    position: Option<Ebb>,
}

impl<'a> FunctionBuilder<'a> {
    /// Begin building `func`'s body, using `func_ctx` as scratch state. `func_ctx` is
    /// cleared first, so it can be reused across many functions.
    pub fn new(func: &'a mut Function, func_ctx: &'a mut FunctionBuilderContext) -> Self {
        func_ctx.clear();
        Self {
            func,
            func_ctx,
            position: None,
        }
    }

    /// Create a new, empty block. It is not yet part of the function's layout; the first
    /// instruction appended to it will splice it in.
    pub fn create_ebb(&mut self) -> Ebb {
        let ebb = self.func.dfg.make_ebb();
        self.func_ctx.ssa.declare_ebb(ebb);
        self.func_ctx.ebbs.insert(
            ebb,
            EbbData {
                pristine: true,
                filled: false,
            },
        );
        ebb
    }

    /// Append one formal parameter of type `ty` to `ebb`, returning the new value. Used for
    /// the entry block's incoming arguments, which are not resolved through `use_var`.
    pub fn append_ebb_param(&mut self, ebb: Ebb, ty: Type) -> Value {
        self.func.dfg.append_ebb_param(ebb, ty)
    }

    /// Start appending instructions to `ebb`. The previously selected block, if any, must
    /// already have a terminator.
    pub fn switch_to_block(&mut self, ebb: Ebb) {
        if let Some(prev) = self.position {
            debug_assert!(
                self.func_ctx.ebbs[&prev].filled,
                "switched away from {} before it was terminated",
                prev
            );
        }
        self.position = Some(ebb);
    }

    /// The block instructions are currently being appended to.
    pub fn current_ebb(&self) -> Option<Ebb> {
        self.position
    }

    /// Declare that every predecessor of `var` is known in `ty`'s scope and the variable
    /// should resolve to `ty`-typed values.
    pub fn declare_var(&mut self, var: Variable, ty: Type) {
        self.func_ctx.types.insert(var, ty);
    }

    /// The current value of `var`, resolving through block parameters and predecessor
    /// blocks as needed.
    pub fn use_var(&mut self, var: Variable) -> Value {
        let ty = *self
            .func_ctx
            .types
            .get(&var)
            .unwrap_or_else(|| panic!("{:?} used before declare_var", var));
        let ebb = self.position.expect("use_var called with no current block");
        self.func_ctx.ssa.use_var(self.func, var, ty, ebb)
    }

    /// Record `val` as `var`'s current definition in the block being built.
    pub fn def_var(&mut self, var: Variable, val: Value) {
        let ebb = self.position.expect("def_var called with no current block");
        self.func_ctx.ssa.def_var(var, ebb, val);
    }

    /// Declare that all of `ebb`'s predecessors are now known, filling in the operand list
    /// of every block parameter created speculatively while it was unsealed.
    pub fn seal_block(&mut self, ebb: Ebb) {
        self.func_ctx.ssa.seal_block(self.func, ebb);
    }

    /// Seal every block created so far that isn't sealed yet, in creation order. Call once
    /// a function's body is fully translated.
    pub fn seal_all_blocks(&mut self) {
        let order: std::vec::Vec<Ebb> = self.func.layout.ebbs().collect();
        self.func_ctx.ssa.seal_all_blocks(self.func, &order);
    }

    /// Whether `ebb` is sealed.
    pub fn is_sealed(&self, ebb: Ebb) -> bool {
        self.func_ctx.ssa.is_sealed(ebb)
    }

    /// The formal parameters of `ebb`, in declaration order.
    pub fn ebb_params(&self, ebb: Ebb) -> &[Value] {
        self.func.dfg.ebb_params(ebb)
    }

    /// Retarget `inst` (a `brz`/`brnz` previously appended with an empty-or-partial argument
    /// list) to `new_dest` instead of whatever block it currently targets. Used when an
    /// `if`'s conditional branch is discovered to need an `else` block spliced in between it
    /// and the merge block.
    pub fn change_jump_destination(&mut self, inst: waot_codegen::ir::Inst, new_dest: Ebb) {
        let pred = self
            .func
            .layout
            .inst_ebb(inst)
            .expect("inst must already be inserted");
        let old_dest = match self.func.dfg.inst_data(inst) {
            InstructionData::Branch { call, .. } => call.dest,
            other => panic!("{:?} is not a conditional branch", other),
        };
        match self.func.dfg.inst_data_mut(inst) {
            InstructionData::Branch { call, .. } => call.dest = new_dest,
            _ => unreachable!(),
        }
        self.func_ctx
            .ssa
            .change_ebb_predecessor(old_dest, new_dest, pred, inst);
    }

    fn ensure_inserted(&mut self, ebb: Ebb) {
        let data = self
            .func_ctx
            .ebbs
            .get_mut(&ebb)
            .expect("ebb used before create_ebb");
        if data.pristine {
            data.pristine = false;
            self.func.layout.append_ebb(ebb);
        }
    }

    fn insert(&mut self, data: InstructionData) -> waot_codegen::ir::Inst {
        let ebb = self
            .position
            .expect("instruction inserted with no current block");
        debug_assert!(
            !self.func_ctx.ebbs[&ebb].filled,
            "block {} is already filled",
            ebb
        );
        self.ensure_inserted(ebb);
        let is_terminator = data.opcode().is_terminator();
        let dest = data.branch_destination();
        let inst = self.func.dfg.make_inst(data);
        let mut cursor = FuncCursor::new(self.func);
        cursor.at_bottom(ebb);
        cursor.insert_inst(inst);
        if let Some(dest) = dest {
            self.func_ctx.ssa.declare_ebb_predecessor(dest, ebb, inst);
        }
        if is_terminator {
            self.func_ctx.ebbs.get_mut(&ebb).unwrap().filled = true;
        }
        inst
    }

    /// `iconst`/`fconst`: materialize a 64-bit-wide immediate, reinterpreted to `ty`'s
    /// width by the lowering stage.
    pub fn ins_iconst(&mut self, ty: Type, imm: i64) -> Value {
        let inst = self.insert(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm,
        });
        self.func.dfg.append_result(inst, ty)
    }

    /// `fconst`.
    pub fn ins_fconst(&mut self, ty: Type, bits: u64) -> Value {
        let inst = self.insert(InstructionData::UnaryIeee {
            opcode: Opcode::Fconst,
            bits,
        });
        self.func.dfg.append_result(inst, ty)
    }

    /// A one-operand instruction (`sextend`/`uextend`).
    pub fn ins_unary(&mut self, opcode: Opcode, arg: Value, ty: Type) -> Value {
        let inst = self.insert(InstructionData::Unary { opcode, arg });
        self.func.dfg.append_result(inst, ty)
    }

    /// A two-operand instruction (arithmetic, bitwise, shift).
    pub fn ins_binary(&mut self, opcode: Opcode, lhs: Value, rhs: Value, ty: Type) -> Value {
        let inst = self.insert(InstructionData::Binary {
            opcode,
            args: [lhs, rhs],
        });
        self.func.dfg.append_result(inst, ty)
    }

    /// `icmp`, producing an `i32` of 0 or 1.
    pub fn ins_icmp(&mut self, cc: IntCC, lhs: Value, rhs: Value) -> Value {
        self.ins_binary(Opcode::Icmp(cc), lhs, rhs, Type::I32)
    }

    /// `fcmp`, producing an `i32` of 0 or 1.
    pub fn ins_fcmp(&mut self, cc: FloatCC, lhs: Value, rhs: Value) -> Value {
        self.ins_binary(Opcode::Fcmp(cc), lhs, rhs, Type::I32)
    }

    /// `load`.
    pub fn ins_load(&mut self, ty: Type, base: Value, offset: i32) -> Value {
        let inst = self.insert(InstructionData::MemOp {
            opcode: Opcode::Load,
            arg: base,
            base,
            offset,
            ty,
        });
        self.func.dfg.append_result(inst, ty)
    }

    /// `store`.
    pub fn ins_store(&mut self, ty: Type, arg: Value, base: Value, offset: i32) {
        self.insert(InstructionData::MemOp {
            opcode: Opcode::Store,
            arg,
            base,
            offset,
            ty,
        });
    }

    /// `call`, returning the callee's results in order.
    pub fn ins_call(&mut self, func_ref: FuncRef, args: std::vec::Vec<Value>, ret_tys: &[Type]) -> std::vec::Vec<Value> {
        let inst = self.insert(InstructionData::Call { func_ref, args });
        ret_tys
            .iter()
            .map(|&ty| self.func.dfg.append_result(inst, ty))
            .collect()
    }

    /// `call_indirect`.
    pub fn ins_call_indirect(
        &mut self,
        sig_ref: SigRef,
        type_id: u32,
        table_index_arg: Value,
        args: std::vec::Vec<Value>,
        ret_tys: &[Type],
    ) -> std::vec::Vec<Value> {
        let inst = self.insert(InstructionData::CallIndirect {
            sig_ref,
            table_index_arg,
            type_id,
            args,
        });
        ret_tys
            .iter()
            .map(|&ty| self.func.dfg.append_result(inst, ty))
            .collect()
    }

    /// `jump`.
    pub fn ins_jump(&mut self, dest: Ebb, args: std::vec::Vec<Value>) {
        self.insert(InstructionData::Jump {
            call: BlockCall { dest, args },
        });
    }

    /// An unconditional jump with no block arguments, the common case when falling through
    /// to straight-line code.
    pub fn ins_jump_empty(&mut self, dest: Ebb) {
        self.insert(InstructionData::Jump {
            call: empty_block_call(dest),
        });
    }

    /// `brz`/`brnz`: branch to `dest` if `cond` is zero/nonzero, else fall through.
    pub fn ins_branch(&mut self, opcode: Opcode, cond: Value, dest: Ebb, args: std::vec::Vec<Value>) {
        debug_assert!(matches!(opcode, Opcode::Brz | Opcode::Brnz));
        self.insert(InstructionData::Branch {
            opcode,
            cond,
            call: BlockCall { dest, args },
        });
    }

    /// `br_table`.
    pub fn ins_br_table(&mut self, cond: Value, table: JumpTable) {
        self.insert(InstructionData::BranchTable { cond, table });
    }

    /// `return`.
    pub fn ins_return(&mut self, args: std::vec::Vec<Value>) {
        self.insert(InstructionData::Return { args });
    }

    /// `trap`.
    pub fn ins_trap(&mut self, code: TrapCode) {
        self.insert(InstructionData::Trap {
            opcode: Opcode::Trap,
            cond: None,
            code,
        });
    }

    /// `trapz`/`trapnz`.
    pub fn ins_cond_trap(&mut self, opcode: Opcode, cond: Value, code: TrapCode) {
        debug_assert!(matches!(opcode, Opcode::Trapz | Opcode::Trapnz));
        self.insert(InstructionData::Trap {
            opcode,
            cond: Some(cond),
            code,
        });
    }

    /// Declare a new jump table with `default` as its out-of-range target.
    pub fn create_jump_table(&mut self, default: Ebb) -> JumpTable {
        use waot_codegen::ir::JumpTableData;
        self.func.dfg.jump_tables.push(JumpTableData::new(default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waot_entity::EntityRef;

    #[test]
    fn straight_line_function_builds() {
        let mut func = Function::new();
        let mut ctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut func, &mut ctx);

        let entry = b.create_ebb();
        b.switch_to_block(entry);
        let v0 = b.ins_iconst(Type::I32, 1);
        let v1 = b.ins_iconst(Type::I32, 2);
        let sum = b.ins_binary(Opcode::Iadd, v0, v1, Type::I32);
        b.ins_return(std::vec![sum]);
        b.seal_all_blocks();

        assert_eq!(func.layout.ebbs().collect::<std::vec::Vec<_>>(), [entry]);
        assert_eq!(func.layout.ebb_insts(entry).count(), 3);
    }

    #[test]
    fn branch_wires_up_phi_through_seal() {
        let mut func = Function::new();
        let mut ctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut func, &mut ctx);

        let entry = b.create_ebb();
        let then_blk = b.create_ebb();
        let else_blk = b.create_ebb();
        let merge = b.create_ebb();

        let var = Variable::new(0);
        b.declare_var(var, Type::I32);

        b.switch_to_block(entry);
        let cond = b.ins_iconst(Type::I32, 0);
        b.ins_branch(Opcode::Brnz, cond, then_blk, std::vec::Vec::new());
        b.ins_jump_empty(else_blk);
        b.seal_block(entry);

        b.switch_to_block(then_blk);
        let one = b.ins_iconst(Type::I32, 1);
        b.def_var(var, one);
        b.ins_jump_empty(merge);
        b.seal_block(then_blk);

        b.switch_to_block(else_blk);
        let two = b.ins_iconst(Type::I32, 2);
        b.def_var(var, two);
        b.ins_jump_empty(merge);
        b.seal_block(else_blk);

        b.switch_to_block(merge);
        let result = b.use_var(var);
        b.ins_return(std::vec![result]);
        b.seal_block(merge);

        assert_eq!(func.dfg.ebb_params(merge).len(), 1);
        assert_eq!(result, func.dfg.ebb_params(merge)[0]);
    }
}
