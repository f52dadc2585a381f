//! Small helpers and index newtypes shared by `code_translator` and `environ`.
//!
//! Grounded on the teacher's `cranelift-wasm::translation_utils`, trimmed to the pieces the
//! translator actually needs: wasm-to-IR type mapping and the four index spaces a module
//! partitions its external references into.

use waot_codegen::ir::Type;
use waot_entity::entity_impl;

use crate::environ::WasmError;
use crate::environ::WasmResult;

/// Index of a function, in either the imported or locally defined function space.
#[derive(Copy, Clone)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex, "fn");

/// Index of a function signature (type).
#[derive(Copy, Clone)]
pub struct SignatureIndex(u32);
entity_impl!(SignatureIndex, "sig");

/// Index of a table.
#[derive(Copy, Clone)]
pub struct TableIndex(u32);
entity_impl!(TableIndex, "table");

/// Index of a linear memory.
#[derive(Copy, Clone)]
pub struct MemoryIndex(u32);
entity_impl!(MemoryIndex, "mem");

/// Index of a global variable.
#[derive(Copy, Clone)]
pub struct GlobalIndex(u32);
entity_impl!(GlobalIndex, "global");

/// Map a decoded wasm value type to this crate's IR type. Block types that carry no value
/// (`wasmparser::Type::EmptyBlockType`) and reference types aren't representable as an IR
/// value type and are reported as an error; callers that only care about value-carrying
/// block results treat that error as "no ebb parameter needed" rather than a hard failure.
pub fn type_to_type(ty: wasmparser::Type) -> WasmResult<Type> {
    match ty {
        wasmparser::Type::I32 => Ok(Type::I32),
        wasmparser::Type::I64 => Ok(Type::I64),
        wasmparser::Type::F32 => Ok(Type::F32),
        wasmparser::Type::F64 => Ok(Type::F64),
        _ => Err(WasmError::InvalidWebAssembly(
            "type has no direct IR value representation".into(),
        )),
    }
}

/// The number of values a block type produces: 0 for the empty block type, 1 otherwise.
/// This crate does not support the multi-value proposal's full block-result-type encoding.
pub fn num_return_values(ty: wasmparser::Type) -> usize {
    match ty {
        wasmparser::Type::EmptyBlockType => 0,
        _ => 1,
    }
}

/// Reinterpret a wasm `f32.const`'s raw bits as this IR's `UnaryIeee` payload width.
pub fn f32_bits(bits: u32) -> u64 {
    u64::from(bits)
}

/// Reinterpret a wasm `f64.const`'s raw bits as this IR's `UnaryIeee` payload width.
pub fn f64_bits(bits: u64) -> u64 {
    bits
}
