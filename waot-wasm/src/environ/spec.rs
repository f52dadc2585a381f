//! The policy surface the translator defers to: everything it cannot decide on its own
//! because it depends on how the embedding runtime lays out memories, tables, globals, and
//! the module-context-offset descriptor (SPEC_FULL.md section 4.6).
//!
//! Grounded on the teacher's `cranelift-wasm::environ::spec`: a `FuncEnvironment` trait the
//! translator is generic over, a `GlobalVariable` enum distinguishing a constant-folded
//! global from one backed by a memory cell, and a `WasmError`/`WasmResult` pair the whole
//! crate threads errors through.

use failure_derive::Fail;
use waot_codegen::ir::{FuncRef, Function, Inst, SigRef, Type, Value};

use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, SignatureIndex, TableIndex};

/// Failure translating a wasm function body: either the input was structurally invalid
/// (should have been caught by module-level validation, so this is defensive) or the
/// embedding environment rejected a request the translator made of it.
#[derive(Debug, Fail)]
pub enum WasmError {
    /// The operator stream doesn't type-check: a stack-underflow, a branch to an undeclared
    /// label depth, or a block type with no IR representation in a position requiring one.
    #[fail(display = "invalid WebAssembly: {}", 0)]
    InvalidWebAssembly(std::string::String),
    /// The environment couldn't satisfy a request (an unresolvable function/table/memory
    /// index, typically meaning the module-context-offset descriptor is incomplete).
    #[fail(display = "unsupported in this environment: {}", 0)]
    Unsupported(std::string::String),
}

/// The result type every translation entry point returns.
pub type WasmResult<T> = std::result::Result<T, WasmError>;

/// How a `return` should be lowered: either directly, or as a fallthrough jump to the
/// function's single exit block (useful for environments that want every function to have
/// exactly one return instruction, to attach epilogue-adjacent instrumentation).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ReturnMode {
    /// Lower `return` directly to `InstructionData::Return`.
    NormalReturns,
    /// Lower `return` to a jump to the function's exit block.
    FallthroughReturn,
}

/// How a global variable's current value is obtained.
pub enum GlobalVariable {
    /// The global never changes at runtime; its value is known at translation time.
    Const(Value),
    /// The global is backed by a memory cell reachable from `base + offset`.
    Memory {
        /// The address of the cell.
        base: Value,
        /// Byte offset from `base`.
        offset: i32,
        /// The global's value type.
        ty: Type,
    },
}

/// Target- and embedding-specific policy the translator is generic over. One instance is
/// shared across every function body translated for a given module.
pub trait FuncEnvironment {
    /// The IR type used to represent a wasm pointer (memory base, table element, function
    /// reference). Always `Type::I64` for this backend's 64-bit AArch64 target, but kept as
    /// a method rather than a constant so `DummyEnvironment` and a real module environment
    /// can both implement the trait uniformly.
    fn pointer_type(&self) -> Type {
        Type::I64
    }

    /// How `return` should be lowered.
    fn return_mode(&self) -> ReturnMode {
        ReturnMode::NormalReturns
    }

    /// Resolve `index` to a `FuncRef` the current function can call directly, importing the
    /// external function declaration into `func` the first time it's referenced.
    fn make_direct_func(&mut self, func: &mut Function, index: FuncIndex) -> WasmResult<FuncRef>;

    /// Resolve `index` to a `SigRef` describing an indirectly-called function's signature.
    fn make_indirect_sig(&mut self, func: &mut Function, index: SignatureIndex) -> WasmResult<SigRef>;

    /// The value that indexes into `table_index`'s element area (usually just the callee
    /// index popped off the wasm stack, passed back unchanged); exists as a seam so an
    /// environment backed by more than one table can rebase it.
    fn table_index_arg(&mut self, table_index: TableIndex, callee: Value) -> WasmResult<Value> {
        let _ = table_index;
        Ok(callee)
    }

    /// Emit whatever instructions are needed to perform a direct call, returning the call
    /// instruction (so the translator can read its results).
    fn translate_call(
        &mut self,
        builder: &mut waot_frontend::FunctionBuilder,
        index: FuncIndex,
        fref: FuncRef,
        args: &[Value],
    ) -> WasmResult<Inst>;

    /// Emit whatever instructions are needed to perform an indirect call (the type-ID
    /// check against the callee's table slot is the environment's responsibility, since the
    /// type-ID encoding lives in the module-context-offset descriptor).
    #[allow(clippy::too_many_arguments)]
    fn translate_call_indirect(
        &mut self,
        builder: &mut waot_frontend::FunctionBuilder,
        table_index: TableIndex,
        sig_index: SignatureIndex,
        sig_ref: SigRef,
        callee: Value,
        args: &[Value],
    ) -> WasmResult<Inst>;

    /// Resolve a global variable read/write target.
    fn make_global(&mut self, func: &mut Function, index: GlobalIndex) -> WasmResult<GlobalVariable>;

    /// The address of `memory_index`'s linear memory base, to add a load/store offset to.
    /// Memory instantiation itself (bounds, growth) is out of this crate's scope; the
    /// environment supplies only the base pointer a `load`/`store` instruction needs.
    fn memory_base(
        &mut self,
        builder: &mut waot_frontend::FunctionBuilder,
        memory_index: MemoryIndex,
    ) -> WasmResult<Value>;
}
