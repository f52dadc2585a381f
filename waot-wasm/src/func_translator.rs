//! Drives translation of one whole function body: builds the entry block with the wasm
//! calling convention's prefix parameters, declares locals, then feeds every decoded operator
//! to `translate_operator` until the body's closing `End`.
//!
//! Grounded on the shape of the teacher's `cranelift-wasm::func_translator::FuncTranslator`,
//! trimmed to drop its value-label/debug-info tracking (not grounded in anything SPEC_FULL.md
//! names) and to take an already-built `wasmparser::OperatorsReader` rather than a whole
//! module's `FunctionBody`, since per-function decoding of an already-isolated byte stream is
//! this crate's boundary (SPEC_FULL.md section 1): the module section structure around it is
//! an external collaborator's job.

use waot_codegen::ir::{Function, Type};
use waot_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use wasmparser::OperatorsReader;

use crate::code_translator::translate_operator;
use crate::environ::{FuncEnvironment, WasmError, WasmResult};
use crate::state::TranslationState;

/// One run-length-encoded local declaration: `count` consecutive slots of type `ty`, the wasm
/// binary format's own encoding for a function body's locals.
#[derive(Clone, Copy, Debug)]
pub struct LocalDecl {
    /// How many consecutive local slots this declaration covers.
    pub count: u32,
    /// Their shared value type.
    pub ty: Type,
}

/// Translate one function body into `func`, which must already carry the function's
/// `Signature::wasm`-shaped signature (execution-context and module-instance prefix
/// included).
///
/// `locals` describes every declared local beyond the parameters, in declaration order;
/// every local (including parameters) is zero-initialized before the first operator runs,
/// matching the WebAssembly specification's local-initialization rule. `code` is the raw
/// operator bytecode of the function body, already isolated from its enclosing module.
pub fn translate_function_body<FE: FuncEnvironment + ?Sized>(
    func: &mut Function,
    locals: &[LocalDecl],
    code: &[u8],
    environ: &mut FE,
) -> WasmResult<()> {
    let wasm_param_types: std::vec::Vec<Type> =
        func.signature.params.iter().skip(2).map(|p| p.value_type).collect();

    let mut fb_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(func, &mut fb_ctx);
    let mut state = TranslationState::new();

    let entry = builder.create_ebb();
    builder.append_ebb_param(entry, Type::REF);
    builder.append_ebb_param(entry, Type::REF);
    let param_values: std::vec::Vec<_> = wasm_param_types
        .iter()
        .map(|&ty| builder.append_ebb_param(entry, ty))
        .collect();
    builder.switch_to_block(entry);

    let mut next_local = 0u32;
    for (&ty, &value) in wasm_param_types.iter().zip(param_values.iter()) {
        let var = Variable::from_u32(next_local);
        builder.declare_var(var, ty);
        builder.def_var(var, value);
        next_local += 1;
    }
    for decl in locals {
        for _ in 0..decl.count {
            let var = Variable::from_u32(next_local);
            builder.declare_var(var, decl.ty);
            let zero = zero_value(&mut builder, decl.ty);
            builder.def_var(var, zero);
            next_local += 1;
        }
    }

    let num_returns = builder.func.signature.returns.len();
    let exit = builder.create_ebb();
    for ret in builder.func.signature.returns.clone() {
        builder.append_ebb_param(exit, ret.value_type);
    }
    state.push_block(exit, num_returns);

    let mut reader = OperatorsReader::new(code, 0);
    while !reader.eof() {
        let op = reader
            .read()
            .map_err(|e| WasmError::InvalidWebAssembly(e.to_string()))?;
        translate_operator(op, &mut builder, &mut state, environ)?;
    }

    if state.reachable {
        let args = state.peekn(num_returns).to_vec();
        builder.ins_return(args);
    }
    builder.seal_all_blocks();

    Ok(())
}

fn zero_value(builder: &mut FunctionBuilder, ty: Type) -> waot_codegen::ir::Value {
    if ty.is_float() {
        builder.ins_fconst(ty, 0)
    } else {
        builder.ins_iconst(ty, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waot_codegen::ir::{ExternalName, Signature};

    use crate::environ::DummyEnvironment;

    #[test]
    fn translates_add_two_params() {
        let mut func = Function::with_name_signature(
            ExternalName::user(0),
            Signature::wasm(&[Type::I32, Type::I32], &[Type::I32]),
        );
        let mut environ = DummyEnvironment::new();

        // (local.get 0) (local.get 1) (i32.add) (end)
        let code: &[u8] = &[0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b];
        translate_function_body(&mut func, &[], code, &mut environ).expect("translate");

        assert_eq!(func.layout.ebbs().count(), 1);
    }
}
