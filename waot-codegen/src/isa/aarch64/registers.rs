//! The AArch64 register file.
//!
//! The teacher generates its register tables at build time from a `Builder` DSL
//! (`isa/arm64/registers.rs` includes `$OUT_DIR/registers-arm64.rs`); this crate has exactly
//! one target and a fixed, small register file, so the tables are hand-written directly
//! instead of carrying the code generator forward for a single user.
//!
//! `x31` (the architectural stack pointer / zero register depending on context) is
//! deliberately not part of either register class: it is never a candidate for allocation
//! and is addressed directly by the ABI and emission code as a symbolic operand.

use crate::isa::registers::{RegBank, RegClass, RegClassData, RegInfo, RegUnit, RegUnitMask};

/// `x0`..`x30`: 31 general-purpose 64-bit registers (`w0`..`w30` are their low 32 bits).
pub const GPR_FIRST_UNIT: RegUnit = 0;
/// `v0`..`v31`: 32 SIMD/FP registers (128-bit; `d0..d31`/`s0..s31` are sub-views).
pub const FPR_FIRST_UNIT: RegUnit = 32;

const GPR_MASK: RegUnitMask = [0x7fff_ffff, 0, 0];
const FPR_MASK: RegUnitMask = [0, 0xffff_ffff, 0];

static GPR_DATA: RegClassData = RegClassData {
    name: "GPR",
    index: 0,
    width: 1,
    bank: 0,
    first: GPR_FIRST_UNIT,
    mask: GPR_MASK,
};

static FPR_DATA: RegClassData = RegClassData {
    name: "FPR",
    index: 1,
    width: 1,
    bank: 1,
    first: FPR_FIRST_UNIT,
    mask: FPR_MASK,
};

/// The general-purpose register class: `x0`..`x30`.
pub static GPR: RegClass = &GPR_DATA;
/// The SIMD/FP register class: `v0`..`v31`.
pub static FPR: RegClass = &FPR_DATA;

static BANKS: [RegBank; 2] = [
    RegBank {
        name: "gpr",
        first_unit: GPR_FIRST_UNIT,
        units: 31,
        names: &[],
        prefix: "x",
    },
    RegBank {
        name: "fpr",
        first_unit: FPR_FIRST_UNIT,
        units: 32,
        names: &[],
        prefix: "v",
    },
];

static CLASSES: [RegClass; 2] = [&GPR_DATA, &FPR_DATA];

/// The whole-ISA register description for AArch64.
pub static INFO: RegInfo = RegInfo {
    banks: &BANKS,
    classes: &CLASSES,
};

/// Frame pointer: `x29`.
pub const FP: RegUnit = GPR_FIRST_UNIT + 29;
/// Link register: `x30`.
pub const LR: RegUnit = GPR_FIRST_UNIT + 30;
/// First integer argument/return register: `x0`.
pub const X0: RegUnit = GPR_FIRST_UNIT;
/// Platform register reserved by the AAPCS64 on the relevant targets: `x18`. Excluded from
/// the allocator's usable set by `abi::usable_registers`.
pub const X18: RegUnit = GPR_FIRST_UNIT + 18;
/// First vector/float argument/return register: `v0`.
pub const V0: RegUnit = FPR_FIRST_UNIT;

/// Is `unit` caller-saved under the AAPCS64 (`x0`-`x17`, all of `v0`-`v7` and `v16`-`v31`)?
///
/// Callee-saved: `x19`-`x29` (and `x30`/LR is saved explicitly by the prologue, not through
/// this general mechanism), `v8`-`v15` (only their low 64 bits, but this allocator treats a
/// vector register as a single unit so the whole register is preserved).
pub fn is_caller_saved(unit: RegUnit) -> bool {
    if (GPR_FIRST_UNIT..GPR_FIRST_UNIT + 18).contains(&unit) {
        true
    } else if (FPR_FIRST_UNIT..FPR_FIRST_UNIT + 8).contains(&unit) {
        true
    } else if (FPR_FIRST_UNIT + 16..FPR_FIRST_UNIT + 32).contains(&unit) {
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpr_contains_x0_not_v0() {
        assert!(GPR.contains(X0));
        assert!(!GPR.contains(V0));
        assert!(FPR.contains(V0));
    }

    #[test]
    fn x19_is_callee_saved() {
        assert!(!is_caller_saved(GPR_FIRST_UNIT + 19));
        assert!(is_caller_saved(X0));
    }

    #[test]
    fn display_names() {
        assert_eq!(INFO.display_regunit(X0).to_string(), "x0");
        assert_eq!(INFO.display_regunit(V0).to_string(), "v0");
    }
}
