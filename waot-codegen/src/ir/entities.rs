//! Entity references for the SSA intermediate representation.
//!
//! Each of these is a thin wrapper around a `u32` index into the data structure that owns
//! the corresponding data (see `ir::DataFlowGraph`, `ir::Layout`, `ir::StackSlots`, ...).
//! Keeping these as small `Copy` types rather than references lets the IR be cloned and
//! walked freely without fighting the borrow checker.

use core::fmt;
use core::u32;
use waot_entity::entity_impl;

/// A basic block in a function's layout.
///
/// Named `Ebb` (extended basic block) following the convention that a block may end in
/// exactly one terminator but the builder that constructs it does not need to know that
/// up front.
#[derive(Copy, Clone)]
pub struct Ebb(u32);
entity_impl!(Ebb, "ebb");

/// An SSA value.
#[derive(Copy, Clone)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An instruction.
#[derive(Copy, Clone)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A stack slot.
#[derive(Copy, Clone)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// A reference to an external function, as seen from the function that calls it.
#[derive(Copy, Clone)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A reference to a function signature, used for indirect calls.
#[derive(Copy, Clone)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// A reference to a jump table.
#[derive(Copy, Clone)]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// Entities that can be the location of a verifier or lowering error.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum AnyEntity {
    /// The whole function.
    Function,
    /// A basic block.
    Ebb(Ebb),
    /// An instruction.
    Inst(Inst),
    /// A value.
    Value(Value),
    /// A stack slot.
    StackSlot(StackSlot),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AnyEntity::Function => write!(f, "function"),
            AnyEntity::Ebb(r) => r.fmt(f),
            AnyEntity::Inst(r) => r.fmt(f),
            AnyEntity::Value(r) => r.fmt(f),
            AnyEntity::StackSlot(r) => r.fmt(f),
        }
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

impl From<Ebb> for AnyEntity {
    fn from(r: Ebb) -> Self {
        AnyEntity::Ebb(r)
    }
}
impl From<Inst> for AnyEntity {
    fn from(r: Inst) -> Self {
        AnyEntity::Inst(r)
    }
}
impl From<Value> for AnyEntity {
    fn from(r: Value) -> Self {
        AnyEntity::Value(r)
    }
}
impl From<StackSlot> for AnyEntity {
    fn from(r: StackSlot) -> Self {
        AnyEntity::StackSlot(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waot_entity::EntityRef;

    #[test]
    fn with_number_roundtrip() {
        let v = Value::new(12);
        assert_eq!(v.index(), 12);
        assert_eq!(v.to_string(), "v12");
    }

    #[test]
    fn any_entity_display() {
        let e: AnyEntity = Ebb::new(3).into();
        assert_eq!(e.to_string(), "ebb3");
    }
}
