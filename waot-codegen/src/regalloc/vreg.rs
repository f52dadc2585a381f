//! Entity keys used across the register allocator.

use waot_entity::entity_impl;

/// A spill slot in the per-function spill area, indexed separately from WebAssembly-visible
/// `ir::StackSlot`s so the allocator can hand out fresh slots without touching the frontend's
/// stack-slot table.
#[derive(Clone, Copy)]
pub struct SpillSlot(u32);
entity_impl!(SpillSlot, "ss");
