//! The backend driver: owns one function through the whole pipeline from verified SSA to
//! finalized machine code.
//!
//! Grounded on the shape of the teacher's `cranelift-codegen::Context` (a single persistent
//! object exposing one `compile`-style entry point, reused function-to-function so its
//! internal scratch storage doesn't reallocate), trimmed to the single AArch64 target and
//! single-pass register allocator SPEC_FULL.md section 4.3/4.4 scope this crate to: there is
//! no `TargetIsa` trait object to dispatch through, so `compile` calls straight into
//! `isa::aarch64`.

use log::debug;

use crate::binemit::finalize::{self, FinalizedFunction};
use crate::flowgraph::ControlFlowGraph;
use crate::ir::Function;
use crate::isa::aarch64::abi;
use crate::isa::aarch64::lower;
use crate::isa::aarch64::registers::is_caller_saved;
use crate::regalloc;
use crate::result::{CodegenError, CodegenResult};
use crate::settings::Flags;
use crate::verifier::verify_function;

/// Persistent state for compiling one function at a time. Reusable across functions so the
/// register allocator's spill-slot table doesn't reallocate on every call.
pub struct Context {
    /// The function currently being compiled. Callers populate this (typically via
    /// `waot-frontend`'s `FunctionBuilder`) before calling `compile`.
    pub func: Function,
    cfg: ControlFlowGraph,
    regalloc: regalloc::context::Context,
}

impl Context {
    /// A context wrapping a freshly created, empty function.
    pub fn new() -> Self {
        Self {
            func: Function::new(),
            cfg: ControlFlowGraph::new(),
            regalloc: regalloc::context::Context::new(),
        }
    }

    /// Reset to compile a different function, keeping the scratch storage's capacity.
    pub fn clear(&mut self) {
        self.func.clear();
        self.cfg.clear();
        self.regalloc.clear();
    }

    /// Run the full Lower -> RegAlloc -> Finalize -> Encode pipeline over `self.func`.
    ///
    /// If `flags.enable_verifier()`, the function is structurally checked before lowering
    /// begins; a function produced by `waot-wasm`'s translator that fails this check is a bug
    /// in this crate, not in the input WebAssembly, and is reported as
    /// `CodegenError::bug`/`ValidationError` rather than panicking, so an embedding can
    /// recover one function's failure without aborting the whole compilation.
    pub fn compile(&mut self, flags: &Flags) -> CodegenResult<FinalizedFunction> {
        if flags.enable_verifier() {
            let errors = verify_function(&self.func);
            if !errors.is_empty() {
                let message = errors
                    .0
                    .iter()
                    .map(std::string::ToString::to_string)
                    .collect::<std::vec::Vec<_>>()
                    .join("; ");
                return Err(CodegenError::bug(message));
            }
        }

        crate::ir::passes::run(&mut self.func);

        self.cfg.compute(&self.func);

        debug!(
            "compiling {}: {} blocks",
            self.func.name,
            self.func.layout.ebbs().count()
        );

        let mut lowered = lower::lower_function(&self.func, &self.cfg)?;

        let usable = abi::usable_registers();
        let regalloc_result = self.regalloc.run(&mut lowered, &usable, is_caller_saved)?;

        let abi_sig = abi::assign_signature(&self.func.signature);
        finalize::finalize(&lowered, &regalloc_result, abi_sig.stack_arg_bytes)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ExternalName, InstructionData, Signature, Type};

    #[test]
    fn compiles_trivial_add() {
        let mut ctx = Context::new();
        ctx.func = Function::with_name_signature(
            ExternalName::user(0),
            Signature::wasm(&[Type::I32, Type::I32], &[Type::I32]),
        );

        let entry = ctx.func.dfg.make_ebb();
        ctx.func.layout.append_ebb(entry);
        let _ectx = ctx.func.dfg.append_ebb_param(entry, Type::REF);
        let _minst = ctx.func.dfg.append_ebb_param(entry, Type::REF);
        let p0 = ctx.func.dfg.append_ebb_param(entry, Type::I32);
        let p1 = ctx.func.dfg.append_ebb_param(entry, Type::I32);

        let add = ctx.func.dfg.make_inst(InstructionData::Binary {
            opcode: crate::ir::Opcode::Iadd,
            args: [p0, p1],
        });
        let sum = ctx.func.dfg.append_result(add, Type::I32);
        ctx.func.layout.append_inst(add, entry);

        let ret = ctx.func.dfg.make_inst(InstructionData::Return {
            args: std::vec![sum],
        });
        ctx.func.layout.append_inst(ret, entry);

        let flags = Flags::default();
        let result = ctx.compile(&flags).expect("compile");
        assert!(!result.code.is_empty());
        assert_eq!(result.code.len() % 4, 0);
    }
}
