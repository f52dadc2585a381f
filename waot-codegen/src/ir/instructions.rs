//! SSA instruction opcodes and their instruction-specific data.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::{Ebb, FuncRef, JumpTable, SigRef, StackSlot, Value};
use crate::ir::types::Type;
use core::fmt;

/// The trap code written into the execution-context record before branching to a trap
/// sequence (see SPEC_FULL.md section 6, offset 0x00).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrapCode {
    /// `unreachable`.
    UnreachableCodeReached,
    /// Integer division by zero.
    IntegerDivisionByZero,
    /// Signed integer overflow in division/remainder.
    IntegerOverflow,
    /// `call_indirect` type mismatch.
    IndirectCallTypeMismatch,
    /// `call_indirect` index out of the table's bounds.
    TableOutOfBounds,
    /// Memory access out of the linear memory's bounds.
    HeapOutOfBounds,
}

impl TrapCode {
    /// The stable numeric encoding written to the execution-context record.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Opcodes for SSA instructions, grouped the way SPEC_FULL.md section 3 describes them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    // Constants.
    /// Materialize an integer constant.
    Iconst,
    /// Materialize a float constant.
    Fconst,

    // Integer arithmetic.
    /// Integer addition.
    Iadd,
    /// Integer subtraction.
    Isub,
    /// Integer multiplication.
    Imul,
    /// Signed integer division.
    Sdiv,
    /// Unsigned integer division.
    Udiv,

    // Float arithmetic.
    /// Float addition.
    Fadd,
    /// Float subtraction.
    Fsub,
    /// Float multiplication.
    Fmul,
    /// Float division.
    Fdiv,

    // Bitwise & shifts.
    /// Bitwise AND.
    Band,
    /// Bitwise OR.
    Bor,
    /// Bitwise XOR.
    Bxor,
    /// Logical shift left.
    Ishl,
    /// Logical shift right.
    Ushr,
    /// Arithmetic shift right.
    Sshr,

    // Comparisons.
    /// Integer comparison, producing an `i32` of 0 or 1.
    Icmp(IntCC),
    /// Float comparison, producing an `i32` of 0 or 1.
    Fcmp(FloatCC),

    // Sign/zero extension.
    /// Sign-extend a narrower integer to a wider one.
    Sextend,
    /// Zero-extend a narrower integer to a wider one.
    Uextend,

    // Memory.
    /// Load from the linear memory base plus an offset.
    Load,
    /// Store to the linear memory base plus an offset.
    Store,

    // Calls.
    /// Direct call by function reference (intra-module or import).
    Call,
    /// Indirect call through a table slot, with a type-ID check.
    CallIndirect,

    // Control flow.
    /// Unconditional branch with block arguments.
    Jump,
    /// Conditional branch: branches to `then` if the condition is non-zero, else falls to
    /// the next instruction (which is expected to be a `Jump` to the `else` target).
    Brz,
    /// Conditional branch: branches to `then` if the condition is non-zero.
    Brnz,
    /// Branch table (`br_table`): multi-way branch over a bounded integer index.
    BrTable,
    /// Return from the function with zero or more values.
    Return,

    // Traps.
    /// Unconditionally trap with a given trap code.
    Trap,
    /// Trap if the condition is non-zero.
    Trapnz,
    /// Trap if the condition is zero.
    Trapz,
}

impl Opcode {
    /// Is this opcode a block terminator?
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump
                | Opcode::Brz
                | Opcode::Brnz
                | Opcode::BrTable
                | Opcode::Return
                | Opcode::Trap
        )
    }

    /// Is this opcode a branch (conditional or not) that targets another block?
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::Brz | Opcode::Brnz | Opcode::BrTable
        )
    }

    /// Does this opcode have no side effects and no dependence on mutable state, making it
    /// eligible for dead-code elimination when unused?
    pub fn is_pure(self) -> bool {
        matches!(
            self,
            Opcode::Iconst
                | Opcode::Fconst
                | Opcode::Iadd
                | Opcode::Isub
                | Opcode::Imul
                | Opcode::Fadd
                | Opcode::Fsub
                | Opcode::Fmul
                | Opcode::Fdiv
                | Opcode::Band
                | Opcode::Bor
                | Opcode::Bxor
                | Opcode::Ishl
                | Opcode::Ushr
                | Opcode::Sshr
                | Opcode::Icmp(_)
                | Opcode::Fcmp(_)
                | Opcode::Sextend
                | Opcode::Uextend
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Opcode::Iconst => write!(f, "iconst"),
            Opcode::Fconst => write!(f, "fconst"),
            Opcode::Iadd => write!(f, "iadd"),
            Opcode::Isub => write!(f, "isub"),
            Opcode::Imul => write!(f, "imul"),
            Opcode::Sdiv => write!(f, "sdiv"),
            Opcode::Udiv => write!(f, "udiv"),
            Opcode::Fadd => write!(f, "fadd"),
            Opcode::Fsub => write!(f, "fsub"),
            Opcode::Fmul => write!(f, "fmul"),
            Opcode::Fdiv => write!(f, "fdiv"),
            Opcode::Band => write!(f, "band"),
            Opcode::Bor => write!(f, "bor"),
            Opcode::Bxor => write!(f, "bxor"),
            Opcode::Ishl => write!(f, "ishl"),
            Opcode::Ushr => write!(f, "ushr"),
            Opcode::Sshr => write!(f, "sshr"),
            Opcode::Icmp(cc) => write!(f, "icmp.{}", cc),
            Opcode::Fcmp(cc) => write!(f, "fcmp.{}", cc),
            Opcode::Sextend => write!(f, "sextend"),
            Opcode::Uextend => write!(f, "uextend"),
            Opcode::Load => write!(f, "load"),
            Opcode::Store => write!(f, "store"),
            Opcode::Call => write!(f, "call"),
            Opcode::CallIndirect => write!(f, "call_indirect"),
            Opcode::Jump => write!(f, "jump"),
            Opcode::Brz => write!(f, "brz"),
            Opcode::Brnz => write!(f, "brnz"),
            Opcode::BrTable => write!(f, "br_table"),
            Opcode::Return => write!(f, "return"),
            Opcode::Trap => write!(f, "trap"),
            Opcode::Trapnz => write!(f, "trapnz"),
            Opcode::Trapz => write!(f, "trapz"),
        }
    }
}

/// A single entry in a `br_table`: a branch target and the argument values carried to it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct JumpTableData {
    /// The block targeted by each table index, in order.
    pub targets: std::vec::Vec<Ebb>,
    /// The default target used when the index is out of range.
    pub default: Ebb,
}

impl JumpTableData {
    /// An empty jump table with the given default target.
    pub fn new(default: Ebb) -> Self {
        Self {
            targets: std::vec::Vec::new(),
            default,
        }
    }

    /// Append a target.
    pub fn push_entry(&mut self, ebb: Ebb) {
        self.targets.push(ebb);
    }
}

/// A branch destination and its outgoing block-parameter arguments.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockCall {
    /// The destination block.
    pub dest: Ebb,
    /// Values bound to the destination's block parameters, in order.
    pub args: std::vec::Vec<Value>,
}

/// The full, opcode-specific payload of an instruction.
///
/// This plays the role of the teacher's generated `InstructionData` enum, but hand-written:
/// our opcode set is fixed and small (SPEC_FULL.md scopes exactly one calling convention and
/// one target), so there is no instruction-table code generator to write.
#[derive(Clone, PartialEq, Debug)]
pub enum InstructionData {
    /// A 64-bit integer immediate, reinterpreted to the instruction's result type's width.
    UnaryImm { opcode: Opcode, imm: i64 },
    /// A 64-bit float immediate bit pattern.
    UnaryIeee { opcode: Opcode, bits: u64 },
    /// One operand.
    Unary { opcode: Opcode, arg: Value },
    /// Two operands.
    Binary { opcode: Opcode, args: [Value; 2] },
    /// A memory access at `base + offset`.
    MemOp {
        opcode: Opcode,
        arg: Value,
        base: Value,
        offset: i32,
        ty: Type,
    },
    /// `call`: a direct call through a `FuncRef` (resolved to an intra-module or imported
    /// callee by the module-context-offset descriptor at lowering time).
    Call {
        func_ref: FuncRef,
        args: std::vec::Vec<Value>,
    },
    /// `call_indirect`: an indirect call through a table slot with a signature check.
    CallIndirect {
        sig_ref: SigRef,
        table_index_arg: Value,
        type_id: u32,
        args: std::vec::Vec<Value>,
    },
    /// `jump`: unconditional branch.
    Jump { call: BlockCall },
    /// `brz`/`brnz`: conditional branch with a fallthrough to the next instruction on the
    /// untaken path.
    Branch {
        opcode: Opcode,
        cond: Value,
        call: BlockCall,
    },
    /// `br_table`.
    BranchTable { cond: Value, table: JumpTable },
    /// `return`.
    Return { args: std::vec::Vec<Value> },
    /// `trap`/`trapz`/`trapnz`.
    Trap {
        opcode: Opcode,
        cond: Option<Value>,
        code: TrapCode,
    },
}

impl InstructionData {
    /// The opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match *self {
            InstructionData::UnaryImm { opcode, .. } => opcode,
            InstructionData::UnaryIeee { opcode, .. } => opcode,
            InstructionData::Unary { opcode, .. } => opcode,
            InstructionData::Binary { opcode, .. } => opcode,
            InstructionData::MemOp { opcode, .. } => opcode,
            InstructionData::Call { .. } => Opcode::Call,
            InstructionData::CallIndirect { .. } => Opcode::CallIndirect,
            InstructionData::Jump { .. } => Opcode::Jump,
            InstructionData::Branch { opcode, .. } => opcode,
            InstructionData::BranchTable { .. } => Opcode::BrTable,
            InstructionData::Return { .. } => Opcode::Return,
            InstructionData::Trap { opcode, .. } => opcode,
        }
    }

    /// The values this instruction reads, in order.
    pub fn arguments(&self) -> std::vec::Vec<Value> {
        match *self {
            InstructionData::UnaryImm { .. } | InstructionData::UnaryIeee { .. } => {
                std::vec::Vec::new()
            }
            InstructionData::Unary { arg, .. } => std::vec![arg],
            InstructionData::Binary { args, .. } => args.to_vec(),
            InstructionData::MemOp { arg, base, opcode, .. } => {
                if opcode == Opcode::Store {
                    std::vec![arg, base]
                } else {
                    std::vec![base]
                }
            }
            InstructionData::Call { ref args, .. } => args.clone(),
            InstructionData::CallIndirect {
                table_index_arg,
                ref args,
                ..
            } => {
                let mut v = std::vec![table_index_arg];
                v.extend_from_slice(args);
                v
            }
            InstructionData::Jump { ref call } => call.args.clone(),
            InstructionData::Branch { cond, ref call, .. } => {
                let mut v = std::vec![cond];
                v.extend_from_slice(&call.args);
                v
            }
            InstructionData::BranchTable { cond, .. } => std::vec![cond],
            InstructionData::Return { ref args } => args.clone(),
            InstructionData::Trap { cond, .. } => cond.into_iter().collect(),
        }
    }

    /// The block this instruction branches to unconditionally on the taken path, if any.
    pub fn branch_destination(&self) -> Option<Ebb> {
        match *self {
            InstructionData::Jump { ref call } => Some(call.dest),
            InstructionData::Branch { ref call, .. } => Some(call.dest),
            _ => None,
        }
    }

    /// Mutable access to the branch destination, used to rewrite jump targets during block
    /// layout (e.g. folding a `Jump` into a `Fallthrough` or vice versa).
    pub fn branch_destination_mut(&mut self) -> Option<&mut Ebb> {
        match *self {
            InstructionData::Jump { ref mut call } => Some(&mut call.dest),
            InstructionData::Branch { ref mut call, .. } => Some(&mut call.dest),
            _ => None,
        }
    }
}
