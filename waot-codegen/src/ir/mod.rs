//! The intermediate representation: SSA values, instructions, blocks, and the function that
//! owns them.

pub mod condcodes;
pub mod dfg;
pub mod entities;
pub mod extfunc;
pub mod function;
pub mod instructions;
pub mod layout;
pub mod passes;
pub mod stackslot;
pub mod types;

pub use condcodes::{FloatCC, IntCC};
pub use dfg::{DataFlowGraph, ValueDef};
pub use entities::{AnyEntity, Ebb, FuncRef, Inst, JumpTable, SigRef, StackSlot, Value};
pub use extfunc::{AbiParam, ArgumentPurpose, ExtFuncData, ExternalName, Signature};
pub use function::Function;
pub use instructions::{BlockCall, InstructionData, JumpTableData, Opcode, TrapCode};
pub use layout::Layout;
pub use stackslot::{StackSlotData, StackSlots};
pub use types::Type;
