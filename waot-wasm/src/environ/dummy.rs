//! A `FuncEnvironment` with no real module behind it, for translating and inspecting a
//! function body in isolation (unit tests, fuzzing the translator, disassembly dumps).
//!
//! Grounded on the teacher's `cranelift-wasm::environ::dummy::DummyEnvironment`: every
//! function index becomes its own freshly-imported external declaration with a trivial
//! `(i32, i32) -> i32`-shaped signature (good enough to exercise the call-lowering path
//! without a real module to look types up in), and every global is a memory cell at a
//! made-up offset rather than ever being constant-folded.

use waot_codegen::ir::{
    AbiParam, ExtFuncData, ExternalName, FuncRef, Function, Inst, SigRef, Signature, Type, Value,
};
use waot_frontend::FunctionBuilder;

use crate::environ::spec::{FuncEnvironment, GlobalVariable, WasmError, WasmResult};
use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, SignatureIndex, TableIndex};

/// A `FuncEnvironment` for standalone testing: every external reference is synthesized on
/// first use rather than resolved against a real module.
#[derive(Default)]
pub struct DummyEnvironment {
    /// A made-up linear memory base, materialized once and reused.
    memory_base: Option<Value>,
}

impl DummyEnvironment {
    /// A fresh dummy environment.
    pub fn new() -> Self {
        Self::default()
    }

    fn dummy_signature() -> Signature {
        let mut sig = Signature::new();
        sig.params.push(AbiParam::new(Type::I32));
        sig.params.push(AbiParam::new(Type::I32));
        sig.returns.push(AbiParam::new(Type::I32));
        sig
    }
}

impl FuncEnvironment for DummyEnvironment {
    fn make_direct_func(&mut self, func: &mut Function, index: FuncIndex) -> WasmResult<FuncRef> {
        let signature = func.dfg.signatures.push(Self::dummy_signature());
        Ok(func.dfg.ext_funcs.push(ExtFuncData {
            name: ExternalName::user(index.as_u32()),
            signature,
        }))
    }

    fn make_indirect_sig(&mut self, func: &mut Function, _index: SignatureIndex) -> WasmResult<SigRef> {
        Ok(func.dfg.signatures.push(Self::dummy_signature()))
    }

    fn translate_call(
        &mut self,
        builder: &mut FunctionBuilder,
        _index: FuncIndex,
        fref: FuncRef,
        args: &[Value],
    ) -> WasmResult<Inst> {
        let sig = builder.func.dfg.ext_funcs[fref].signature;
        let ret_tys: std::vec::Vec<Type> = builder.func.dfg.signatures[sig]
            .returns
            .iter()
            .map(|p| p.value_type)
            .collect();
        builder.ins_call(fref, args.to_vec(), &ret_tys);
        Ok(builder
            .func
            .layout
            .last_inst(builder.current_ebb().expect("inside a block"))
            .expect("ins_call just appended one"))
    }

    fn translate_call_indirect(
        &mut self,
        builder: &mut FunctionBuilder,
        table_index: TableIndex,
        _sig_index: SignatureIndex,
        sig_ref: SigRef,
        callee: Value,
        args: &[Value],
    ) -> WasmResult<Inst> {
        let table_index_arg = self.table_index_arg(table_index, callee)?;
        let ret_tys: std::vec::Vec<Type> = builder.func.dfg.signatures[sig_ref]
            .returns
            .iter()
            .map(|p| p.value_type)
            .collect();
        builder.ins_call_indirect(sig_ref, 0, table_index_arg, args.to_vec(), &ret_tys);
        Ok(builder
            .func
            .layout
            .last_inst(builder.current_ebb().expect("inside a block"))
            .expect("ins_call_indirect just appended one"))
    }

    fn make_global(&mut self, _func: &mut Function, index: GlobalIndex) -> WasmResult<GlobalVariable> {
        Ok(GlobalVariable::Memory {
            base: self
                .memory_base
                .ok_or_else(|| WasmError::Unsupported("global read before any memory access".into()))?,
            offset: index.as_u32() as i32 * 8,
            ty: Type::I64,
        })
    }

    fn memory_base(&mut self, builder: &mut FunctionBuilder, _memory_index: MemoryIndex) -> WasmResult<Value> {
        if let Some(base) = self.memory_base {
            return Ok(base);
        }
        let base = builder.ins_iconst(Type::I64, 0);
        self.memory_base = Some(base);
        Ok(base)
    }
}
