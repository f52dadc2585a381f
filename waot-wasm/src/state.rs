//! Translation-time state: the operand-value stack mirroring the WebAssembly stack machine,
//! and the control stack tracking nested `block`/`loop`/`if` regions.
//!
//! Grounded on the teacher's `cranelift-wasm::state::{TranslationState, ControlStackFrame}`,
//! trimmed to drop the per-module caching of resolved functions/globals/tables/heaps (this
//! crate re-resolves through `FuncEnvironment` on every use instead, a correctness-over-
//! micro-optimization simplification reasonable at this crate's scale).

use waot_codegen::ir::{Ebb, Inst, Value};

/// One nested `block`/`loop`/`if` region still open during translation.
pub enum ControlStackFrame {
    /// A plain `block ... end`.
    Block {
        /// The block the `End` operator resumes translation at.
        destination: Ebb,
        /// Value-stack depth when this frame was pushed.
        original_stack_size: usize,
        /// How many values the block type produces.
        num_return_values: usize,
        /// Set once some `br`/`br_if`/`br_table` has targeted this frame's exit, so an
        /// `End` reached only through now-dead code still knows `destination` is live.
        branched_to_exit: bool,
    },
    /// A `loop ... end`: branches to depth 0 target the loop header, not `destination`.
    Loop {
        /// The loop body's entry block, targeted by a backward branch.
        header: Ebb,
        /// The block the `End` operator resumes translation at.
        destination: Ebb,
        /// Value-stack depth when this frame was pushed.
        original_stack_size: usize,
        /// How many values the block type produces.
        num_return_values: usize,
        /// Set once some `br`/`br_if`/`br_table` has targeted this frame's exit, so an
        /// `End` reached only through now-dead code still knows `destination` is live.
        branched_to_exit: bool,
    },
    /// An `if ... [else ...] end`.
    If {
        /// The `brz` inserted for the `if` condition, retargeted to an `else` block if one
        /// is encountered.
        branch_inst: Inst,
        /// The block the `End` operator resumes translation at.
        destination: Ebb,
        /// Value-stack depth when this frame was pushed.
        original_stack_size: usize,
        /// How many values the block type produces.
        num_return_values: usize,
        /// Whether the `then` arm can still fall through to `destination` carrying no
        /// `else` clause (cleared once an `Else` operator is seen).
        reachable_from_top: bool,
        /// Set once some `br`/`br_if`/`br_table` has targeted this frame's exit, so an
        /// `End` reached only through now-dead code still knows `destination` is live.
        branched_to_exit: bool,
    },
}

impl ControlStackFrame {
    /// Where a `br`/`br_if` targeting this frame's depth jumps to.
    pub fn br_destination(&self) -> Ebb {
        match *self {
            ControlStackFrame::Block { destination, .. }
            | ControlStackFrame::If { destination, .. } => destination,
            ControlStackFrame::Loop { header, .. } => header,
        }
    }

    /// Where control resumes once this frame's `End` operator is reached.
    pub fn following_code(&self) -> Ebb {
        match *self {
            ControlStackFrame::Block { destination, .. }
            | ControlStackFrame::If { destination, .. }
            | ControlStackFrame::Loop { destination, .. } => destination,
        }
    }

    /// How many values this frame's exit block takes as parameters.
    pub fn num_return_values(&self) -> usize {
        match *self {
            ControlStackFrame::Block { num_return_values, .. }
            | ControlStackFrame::Loop { num_return_values, .. }
            | ControlStackFrame::If { num_return_values, .. } => num_return_values,
        }
    }

    /// The value-stack depth when this frame was pushed, to truncate back to at `End`.
    pub fn original_stack_size(&self) -> usize {
        match *self {
            ControlStackFrame::Block { original_stack_size, .. }
            | ControlStackFrame::Loop { original_stack_size, .. }
            | ControlStackFrame::If { original_stack_size, .. } => original_stack_size,
        }
    }

    /// `br`/`br_table` targeting a loop's depth-0 jumps to the header, which never takes
    /// block-result arguments (a loop's results come out through `following_code` instead).
    pub fn is_loop(&self) -> bool {
        matches!(self, ControlStackFrame::Loop { .. })
    }

    /// Record that a branch has targeted this frame's exit, so its `destination` is known
    /// live even if the `End` that pops this frame is reached only through dead code.
    pub fn set_branched_to_exit(&mut self) {
        match self {
            ControlStackFrame::Block {
                branched_to_exit, ..
            }
            | ControlStackFrame::Loop {
                branched_to_exit, ..
            }
            | ControlStackFrame::If {
                branched_to_exit, ..
            } => *branched_to_exit = true,
        }
    }

    /// Whether some branch has targeted this frame's exit.
    pub fn exit_is_branched_to(&self) -> bool {
        match *self {
            ControlStackFrame::Block {
                branched_to_exit, ..
            }
            | ControlStackFrame::Loop {
                branched_to_exit, ..
            }
            | ControlStackFrame::If {
                branched_to_exit, ..
            } => branched_to_exit,
        }
    }
}

/// The value stack and control stack threaded through a single function body's translation.
pub struct TranslationState {
    /// Mirrors the wasm operand stack.
    pub stack: std::vec::Vec<Value>,
    /// Currently open `block`/`loop`/`if` regions, innermost last.
    pub control_stack: std::vec::Vec<ControlStackFrame>,
    /// Whether the code currently being translated is reachable. Cleared by an
    /// unconditional branch or `unreachable`; a matching `Else`/`End` restores it.
    pub reachable: bool,
}

impl TranslationState {
    /// A fresh state with one implicit top-level frame is expected to be pushed by the
    /// caller (the function's own exit block) before translation begins.
    pub fn new() -> Self {
        Self {
            stack: std::vec::Vec::new(),
            control_stack: std::vec::Vec::new(),
            reachable: true,
        }
    }

    /// Push one value.
    pub fn push1(&mut self, val: Value) {
        self.stack.push(val);
    }

    /// Push every value in `vals`, in order.
    pub fn pushn(&mut self, vals: &[Value]) {
        self.stack.extend_from_slice(vals);
    }

    /// Pop one value.
    pub fn pop1(&mut self) -> Value {
        self.stack.pop().expect("value stack underflow")
    }

    /// Pop two values, returning them in push order (first popped is second operand).
    pub fn pop2(&mut self) -> (Value, Value) {
        let b = self.pop1();
        let a = self.pop1();
        (a, b)
    }

    /// The top value without popping it.
    pub fn peek1(&self) -> Value {
        *self.stack.last().expect("value stack underflow")
    }

    /// The top `n` values, in push order, without popping them.
    pub fn peekn(&self, n: usize) -> &[Value] {
        &self.stack[self.stack.len() - n..]
    }

    /// Pop the top `n` values.
    pub fn popn(&mut self, n: usize) {
        let new_len = self.stack.len() - n;
        self.stack.truncate(new_len);
    }

    /// Begin a `block` region.
    pub fn push_block(&mut self, destination: Ebb, num_return_values: usize) {
        self.control_stack.push(ControlStackFrame::Block {
            destination,
            original_stack_size: self.stack.len(),
            num_return_values,
            branched_to_exit: false,
        });
    }

    /// Begin a `loop` region.
    pub fn push_loop(&mut self, header: Ebb, destination: Ebb, num_return_values: usize) {
        self.control_stack.push(ControlStackFrame::Loop {
            header,
            destination,
            original_stack_size: self.stack.len(),
            num_return_values,
            branched_to_exit: false,
        });
    }

    /// Begin an `if` region.
    pub fn push_if(&mut self, branch_inst: Inst, destination: Ebb, num_return_values: usize) {
        self.control_stack.push(ControlStackFrame::If {
            branch_inst,
            destination,
            original_stack_size: self.stack.len(),
            num_return_values,
            reachable_from_top: true,
            branched_to_exit: false,
        });
    }
}

impl Default for TranslationState {
    fn default() -> Self {
        Self::new()
    }
}
