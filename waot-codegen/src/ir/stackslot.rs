//! Explicit stack slots.
//!
//! The core itself never asks WebAssembly for explicit stack slots (locals all live in
//! VRegs until the allocator spills them); this type exists for parity with the teacher's
//! `ir::StackSlotData` and for future extensions that need a named, fixed-size stack
//! allocation distinct from the spill area (e.g. an address-taken local).

use waot_entity::PrimaryMap;

use crate::ir::entities::StackSlot;

/// A stack slot's static description.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StackSlotData {
    /// Size in bytes.
    pub size: u32,
}

impl StackSlotData {
    /// A new stack slot of the given size.
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

/// All stack slots declared in a function.
pub type StackSlots = PrimaryMap<StackSlot, StackSlotData>;
