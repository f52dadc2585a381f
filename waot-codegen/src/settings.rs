//! Compiler-wide configuration flags.
//!
//! Grounded on `cranelift-codegen::settings`: a plain struct with a small builder, not a
//! generic config-file loader (see SPEC_FULL.md section 10) — this compiler core is invoked
//! in-process, not configured from a file on disk.

use target_lexicon::Triple;

/// Compiler-wide toggles.
#[derive(Clone, Debug)]
pub struct Flags {
    /// Re-run structural checks after each mandatory SSA pass and after register allocation.
    /// Expensive; meant for development and tests, not hot compilation paths.
    enable_verifier: bool,
    /// Fold a branch to an unconditional jump whose sole target is itself redundant during
    /// branch relaxation.
    enable_jump_folding: bool,
    /// The target triple. Only `aarch64-*` is supported by the lowering stage; anything else
    /// fails fast with `CodegenError::unsupported`.
    triple: Triple,
}

impl Flags {
    /// Default flags for the given target triple: verifier and jump folding both on.
    pub fn new(triple: Triple) -> Self {
        Self {
            enable_verifier: true,
            enable_jump_folding: true,
            triple,
        }
    }

    /// Whether the verifier should run after each pass.
    pub fn enable_verifier(&self) -> bool {
        self.enable_verifier
    }

    /// Set whether the verifier runs after each pass.
    pub fn set_enable_verifier(&mut self, yes: bool) {
        self.enable_verifier = yes;
    }

    /// Whether branch relaxation folds redundant jumps.
    pub fn enable_jump_folding(&self) -> bool {
        self.enable_jump_folding
    }

    /// Set whether branch relaxation folds redundant jumps.
    pub fn set_enable_jump_folding(&mut self, yes: bool) {
        self.enable_jump_folding = yes;
    }

    /// The configured target triple.
    pub fn triple(&self) -> &Triple {
        &self.triple
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::new(Triple::unknown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_verifier() {
        let flags = Flags::default();
        assert!(flags.enable_verifier());
        assert!(flags.enable_jump_folding());
    }
}
