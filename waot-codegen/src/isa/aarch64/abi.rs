//! AArch64 calling convention: argument/return register assignment, frame layout, and the
//! execution-context prefix parameters every WebAssembly function body carries.
//!
//! Grounded on SPEC_FULL.md section 4.3's "Calling convention" note (an AAPCS64 variant with
//! an (execCtx, moduleInstance) prefix) and laid out the way the teacher's ABI modules
//! (`isa/*/abi.rs`) separate argument assignment from frame-slot symbolic resolution.

use crate::ir::{AbiParam, ArgumentPurpose, Signature, Type};
use crate::isa::aarch64::registers::{FPR_FIRST_UNIT, GPR_FIRST_UNIT, X18};
use crate::isa::registers::RegUnit;
use crate::regalloc::register_set::RegisterSet;

/// Number of general-purpose argument/return registers (`x0`-`x7`).
const NUM_GPR_ARGS: u32 = 8;
/// Number of float/vector argument/return registers (`v0`-`v7`).
const NUM_FPR_ARGS: u32 = 8;

/// Where one argument or return value was assigned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgLoc {
    /// A register unit.
    Reg(RegUnit),
    /// A 16-byte-aligned slot in the outgoing-argument (or incoming-argument) area, given as
    /// a byte offset from the area's base.
    Stack(u32),
}

/// The result of assigning locations to every parameter and return value of a `Signature`.
pub struct AbiSignature {
    /// One location per parameter, in declaration order (prefix params included).
    pub params: std::vec::Vec<ArgLoc>,
    /// One location per return value, in declaration order.
    pub returns: std::vec::Vec<ArgLoc>,
    /// Total bytes of outgoing-argument stack space this call requires.
    pub stack_arg_bytes: u32,
}

struct Assigner {
    next_gpr: u32,
    next_fpr: u32,
    stack_offset: u32,
}

impl Assigner {
    fn new() -> Self {
        Self {
            next_gpr: 0,
            next_fpr: 0,
            stack_offset: 0,
        }
    }

    fn assign(&mut self, param: &AbiParam) -> ArgLoc {
        if param.value_type.is_float() || param.value_type.is_vector() {
            if self.next_fpr < NUM_FPR_ARGS {
                let unit = FPR_FIRST_UNIT + self.next_fpr as RegUnit;
                self.next_fpr += 1;
                return ArgLoc::Reg(unit);
            }
        } else if self.next_gpr < NUM_GPR_ARGS {
            let unit = GPR_FIRST_UNIT + self.next_gpr as RegUnit;
            self.next_gpr += 1;
            return ArgLoc::Reg(unit);
        }

        let width = param.value_type.bytes().max(8);
        let slot = self.stack_offset;
        self.stack_offset += round_up_to_16(width);
        ArgLoc::Stack(slot)
    }
}

fn round_up_to_16(n: u32) -> u32 {
    (n + 15) & !15
}

/// Assign registers and stack slots to every parameter and return value of `sig`.
///
/// `sig` is expected to already carry the execution-context and module-instance prefix
/// parameters (see `ir::Signature::wasm`): they are assigned like any other pointer-typed
/// parameter, which places them in `x0`/`x1` as SPEC_FULL.md requires, with no special-casing
/// needed here.
pub fn assign_signature(sig: &Signature) -> AbiSignature {
    let mut gpr_fpr = Assigner::new();
    let params = sig.params.iter().map(|p| gpr_fpr.assign(p)).collect();
    let stack_arg_bytes = gpr_fpr.stack_offset;

    let mut ret_assigner = Assigner::new();
    let returns = sig.returns.iter().map(|p| ret_assigner.assign(p)).collect();

    AbiSignature {
        params,
        returns,
        stack_arg_bytes,
    }
}

/// Purpose tag for the two mandatory prefix parameters every wasm function signature begins
/// with (see `ir::Signature::wasm`).
pub fn is_context_param(param: &AbiParam) -> bool {
    matches!(
        param.purpose,
        ArgumentPurpose::ExecutionContext | ArgumentPurpose::ModuleInstance
    )
}

/// The register set the allocator may assign vregs into: every GPR and FPR unit except the
/// ones reserved by the ABI (frame pointer, link register, the AAPCS64 platform register).
pub fn usable_registers() -> RegisterSet {
    use crate::isa::aarch64::registers::{FP, LR};
    let mut set = RegisterSet::new([0x7fff_ffff, 0xffff_ffff, 0]);
    set.take(FP);
    set.take(LR);
    set.take(X18);
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Signature;

    #[test]
    fn prefix_params_land_in_x0_x1() {
        let sig = Signature::wasm(&[Type::I32], &[Type::I32]);
        let abi = assign_signature(&sig);
        assert_eq!(abi.params[0], ArgLoc::Reg(GPR_FIRST_UNIT));
        assert_eq!(abi.params[1], ArgLoc::Reg(GPR_FIRST_UNIT + 1));
        assert_eq!(abi.params[2], ArgLoc::Reg(GPR_FIRST_UNIT + 2));
    }

    #[test]
    fn overflow_args_go_to_stack() {
        let params: std::vec::Vec<Type> = (0..8).map(|_| Type::I32).collect();
        let sig = Signature::wasm(&params, &[]);
        let abi = assign_signature(&sig);
        // x0/x1 are the context prefix, x2..x7 take six of the eight i32 params, two spill.
        assert!(abi.params.iter().any(|l| matches!(l, ArgLoc::Stack(_))));
        assert!(abi.stack_arg_bytes > 0);
    }
}
