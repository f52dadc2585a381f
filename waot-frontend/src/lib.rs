//! Builder helpers for constructing SSA intermediate representation directly, without a
//! stack-based intermediate form. Mirrors the shape of the teacher's `cranelift-frontend`:
//! `ssa::SSABuilder` implements on-the-fly SSA construction (Braun et al.), and
//! `frontend::FunctionBuilder` wraps it with a per-block insertion cursor so a translator
//! (`waot-wasm`) can append one instruction per wasm opcode without tracking phis itself.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub mod frontend;
pub mod ssa;

pub use crate::frontend::{FunctionBuilder, FunctionBuilderContext};
pub use crate::ssa::{SSABuilder, Variable};
