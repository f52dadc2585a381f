//! Target-specific code generation: register tables, ABI, instruction selection, and
//! encoding for the one target SPEC_FULL.md scopes (AArch64).
//!
//! Mirrors the teacher's `cranelift-codegen::isa` split between ISA-generic data (`registers`)
//! and one concrete ISA backend (`aarch64`), but drops the teacher's multi-target
//! `TargetIsa` trait object and builder registry: SPEC_FULL.md section 4.3 scopes this crate
//! to exactly one target, so there's no dispatch to generalize over.

pub mod aarch64;
pub mod registers;
