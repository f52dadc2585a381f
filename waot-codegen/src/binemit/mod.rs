//! Binary machine code emission: the code buffer, relocation records, and the
//! finalize/encode driver (SPEC_FULL.md section 4.5).
//!
//! Grounded on the teacher's `cranelift-codegen::binemit` (`CodeOffset`, `Reloc`, `CodeSink`)
//! but simplified to a single concrete `CodeBuffer` rather than a pluggable `CodeSink` trait:
//! this crate has exactly one consumer of the byte buffer (the caller linking functions into
//! a module), not cranelift's many (JIT sink, object-file sink, filetest sink).

pub mod finalize;

use crate::ir::TrapCode;

/// Offset in bytes from the start of a function's code.
pub type CodeOffset = u32;

/// The one relocation kind this backend emits: a `bl`/`b` target that the linker (or a JIT
/// loader) must patch in once every function's final address is known.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reloc {
    /// AArch64 `bl`/`b` 26-bit PC-relative call target.
    Arm64Call,
}

/// A call site awaiting relocation: `offset` is the byte offset of the `bl` instruction
/// within the function, `callee_index` is the module-level function index it targets.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RelocationSite {
    /// Byte offset of the instruction to patch.
    pub offset: CodeOffset,
    /// Which relocation this is.
    pub reloc: Reloc,
    /// The module-level function index the patched instruction must reach.
    pub callee_index: u32,
}

/// One trap site: the byte offset of the instruction that may trap, and the code it reports.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TrapSite {
    /// Byte offset of the trapping instruction.
    pub offset: CodeOffset,
    /// The trap code this site reports.
    pub code: TrapCode,
}

/// Accumulates a function's machine code and the side tables describing it.
#[derive(Clone, Default)]
pub struct CodeBuffer {
    bytes: std::vec::Vec<u8>,
    relocs: std::vec::Vec<RelocationSite>,
    traps: std::vec::Vec<TrapSite>,
}

impl CodeBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length in bytes, the offset the next `put4` will be written at.
    pub fn offset(&self) -> CodeOffset {
        self.bytes.len() as CodeOffset
    }

    /// Append one 4-byte little-endian instruction word.
    pub fn put4(&mut self, word: u32) {
        self.bytes.extend_from_slice(&word.to_le_bytes());
    }

    /// Append one 8-byte little-endian literal (an `f64` bit pattern, or the low half of a
    /// 128-bit inline payload).
    pub fn put8(&mut self, word: u64) {
        self.bytes.extend_from_slice(&word.to_le_bytes());
    }

    /// Record a call-site relocation at the current offset.
    pub fn reloc_call(&mut self, callee_index: u32) {
        self.relocs.push(RelocationSite {
            offset: self.offset(),
            reloc: Reloc::Arm64Call,
            callee_index,
        });
    }

    /// Record a trap site at the current offset.
    pub fn trap(&mut self, code: TrapCode) {
        self.traps.push(TrapSite {
            offset: self.offset(),
            code,
        });
    }

    /// Consume the buffer, returning the finished byte vector, relocations, and trap sites.
    pub fn finish(self) -> (std::vec::Vec<u8>, std::vec::Vec<RelocationSite>, std::vec::Vec<TrapSite>) {
        (self.bytes, self.relocs, self.traps)
    }
}
