//! Translation from a single WebAssembly function body (as decoded by `wasmparser`) to this
//! crate's SSA intermediate representation, built incrementally with `waot-frontend`'s
//! `FunctionBuilder`.
//!
//! Whole-module binary parsing (sections, validation, the import/export namespace) is out of
//! this crate's scope; it translates one function body at a time, given a `FuncEnvironment`
//! that resolves everything module-specific (SPEC_FULL.md section 4.6's module-context-offset
//! descriptor is how a real embedding would implement that trait).
//!
//! Grounded on the teacher's `cranelift-wasm` crate: `code_translator` mirrors
//! `code_translator.rs`, `state` mirrors `state.rs`, `translation_utils` mirrors
//! `translation_utils.rs`, and `environ` mirrors the `environ` module's `spec`/`dummy` split.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub mod code_translator;
pub mod environ;
pub mod func_translator;
pub mod state;
pub mod translation_utils;

pub use crate::code_translator::translate_operator;
pub use crate::environ::{DummyEnvironment, FuncEnvironment, GlobalVariable, ReturnMode, WasmError, WasmResult};
pub use crate::func_translator::{translate_function_body, LocalDecl};
pub use crate::state::{ControlStackFrame, TranslationState};
pub use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, SignatureIndex, TableIndex};
