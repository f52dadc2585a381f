//! Register allocation: assigns every vreg in the pseudo-instruction stream a physical
//! register or spill slot.
//!
//! Mirrors the teacher's `cranelift-codegen::regalloc` module split, trimmed to the
//! simplified single-pass design SPEC_FULL.md section 4.4 calls for (see `context` and
//! `liveness`); `coalescing`, `spilling`, `reload`, and `coloring` stay merged into one pass
//! rather than four, since this crate's allocator runs per single-function bodies rather than
//! whole-program compilation units.

pub mod api;
pub mod context;
pub mod liveness;
pub mod register_set;
pub mod value_loc;
pub mod vreg;

pub use api::{RaFunction, RaInst, VReg};
pub use context::{Context, RegallocResult};
pub use liveness::Liveness;
pub use register_set::RegisterSet;
pub use value_loc::ValueLoc;
pub use vreg::SpillSlot;
