//! The SSA-form function: owns its data-flow graph, layout, signature, and stack slots.

use core::fmt;

use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::{Ebb, Inst};
use crate::ir::extfunc::{ExternalName, Signature};
use crate::ir::layout::Layout;
use crate::ir::stackslot::{StackSlotData, StackSlots};
use crate::ir::ExtFuncData;

/// A function in SSA form, as handed from the SSA builder to the backend driver.
///
/// Mirrors the teacher's `ir::Function`: the struct owns all of its blocks and instructions,
/// and can be cheaply reset and reused across many compilations (SPEC_FULL.md section 9,
/// "per-function state reuse").
#[derive(Clone)]
pub struct Function {
    /// Identifies this function for diagnostics and relocation records.
    pub name: ExternalName,
    /// The function's calling-convention-shaped signature.
    pub signature: Signature,
    /// Explicit stack slots declared by the translator (distinct from spill slots, which the
    /// register allocator assigns).
    pub stack_slots: StackSlots,
    /// The data-flow graph: every value definition and instruction.
    pub dfg: DataFlowGraph,
    /// The order of blocks and instructions.
    pub layout: Layout,
}

impl Function {
    /// Create an empty function with the given name and signature.
    pub fn with_name_signature(name: ExternalName, signature: Signature) -> Self {
        Self {
            name,
            signature,
            stack_slots: StackSlots::new(),
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
        }
    }

    /// Create an anonymous, empty function.
    pub fn new() -> Self {
        Self::with_name_signature(ExternalName::default(), Signature::new())
    }

    /// Reset this function to empty, reusing the storage already allocated.
    pub fn clear(&mut self) {
        self.signature.clear();
        self.stack_slots.clear();
        self.dfg.clear();
        self.layout.clear();
    }

    /// Declare a new stack slot.
    pub fn create_stack_slot(&mut self, data: StackSlotData) -> crate::ir::StackSlot {
        self.stack_slots.push(data)
    }

    /// Declare a signature for an indirectly-called function, returning a reference to it.
    pub fn import_signature(&mut self, signature: Signature) -> crate::ir::SigRef {
        self.dfg.signatures.push(signature)
    }

    /// Declare an external function (direct call target), returning a reference to it.
    pub fn import_function(&mut self, data: ExtFuncData) -> crate::ir::FuncRef {
        self.dfg.ext_funcs.push(data)
    }

    /// Rewrite the destination of a jump or branch instruction in place. No-op for
    /// non-branch instructions.
    pub fn change_branch_destination(&mut self, inst: Inst, new_dest: Ebb) {
        if let Some(dest) = self.dfg.inst_data_mut(inst).branch_destination_mut() {
            *dest = new_dest;
        }
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "function {}{} {{", self.name, self.signature)?;
        for ebb in self.layout.ebbs() {
            write!(f, "{}(", ebb)?;
            for (i, &v) in self.dfg.ebb_params(ebb).iter().enumerate() {
                if i != 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", v, self.dfg.value_type(v))?;
            }
            writeln!(f, "):")?;
            for inst in self.layout.ebb_insts(ebb) {
                let data = self.dfg.inst_data(inst);
                let results = self.dfg.inst_results(inst);
                write!(f, "    ")?;
                if !results.is_empty() {
                    for (i, &v) in results.iter().enumerate() {
                        if i != 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", v)?;
                    }
                    write!(f, " = ")?;
                }
                writeln!(f, "{} {:?}", data.opcode(), data.arguments())?;
            }
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::InstructionData;
    use crate::ir::types::Type;
    use crate::ir::Opcode;

    #[test]
    fn empty_function_display() {
        let mut func = Function::new();
        let ebb0 = func.dfg.make_ebb();
        func.layout.append_ebb(ebb0);
        let ret = func.dfg.make_inst(InstructionData::Return { args: std::vec::Vec::new() });
        func.layout.append_inst(ret, ebb0);
        let text = func.to_string();
        assert!(text.contains("ebb0"));
        assert!(text.contains("return"));
        let _ = Type::I32;
        let _ = Opcode::Return;
    }
}
