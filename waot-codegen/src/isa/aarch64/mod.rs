//! The AArch64 backend: register file, ABI, pseudo-instructions, instruction selection, and
//! encoding. The only target this crate supports (SPEC_FULL.md section 4.3).

pub mod abi;
pub mod emit;
pub mod inst;
pub mod lower;
pub mod registers;
