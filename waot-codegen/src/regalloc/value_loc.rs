//! Where a vreg currently lives: nowhere yet, a register, or a spill slot.

use core::fmt;

use crate::isa::registers::RegUnit;
use crate::regalloc::vreg::SpillSlot;

/// The location assigned to a vreg at some point in the allocation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueLoc {
    /// Not yet assigned.
    Unassigned,
    /// Lives in a physical register unit.
    Reg(RegUnit),
    /// Lives in a spill slot.
    Stack(SpillSlot),
}

impl ValueLoc {
    /// Has this location been assigned?
    pub fn is_assigned(self) -> bool {
        !matches!(self, ValueLoc::Unassigned)
    }

    /// Unwrap the register unit, panicking if this location isn't a register.
    pub fn unwrap_reg(self) -> RegUnit {
        match self {
            ValueLoc::Reg(r) => r,
            _ => panic!("value location is not a register"),
        }
    }

    /// Unwrap the spill slot, panicking if this location isn't on the stack.
    pub fn unwrap_stack(self) -> SpillSlot {
        match self {
            ValueLoc::Stack(s) => s,
            _ => panic!("value location is not a stack slot"),
        }
    }
}

impl Default for ValueLoc {
    fn default() -> Self {
        ValueLoc::Unassigned
    }
}

impl fmt::Display for ValueLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValueLoc::Unassigned => write!(f, "-"),
            ValueLoc::Reg(r) => write!(f, "%u{}", r),
            ValueLoc::Stack(s) => write!(f, "{}", s),
        }
    }
}
