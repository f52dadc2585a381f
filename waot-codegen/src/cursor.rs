//! Cursors for navigating and inserting into a function's layout in O(1).
//!
//! Adapted from the teacher's `cranelift-codegen::cursor` module: rather than literal owned
//! pointers into the instruction list, a cursor is just "where am I" plus a reference to the
//! function, so inserting doesn't disturb any other cursor's position.

use crate::ir;
use crate::ir::{Ebb, Inst};

/// Where a cursor currently points.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Not pointing anywhere; insertion is not possible until repositioned.
    Nowhere,
    /// Immediately before `Inst`, in its block. Insertion places new instructions before it.
    Before(Ebb),
    /// Immediately after the last instruction of `Ebb` (including an empty block).
    After(Ebb),
    /// At `Inst` itself; insertion places new instructions immediately after it.
    At(Inst),
}

/// Common behavior for cursors that walk a function's layout.
pub trait Cursor {
    /// Shared access to the underlying layout.
    fn layout(&self) -> &ir::Layout;
    /// Mutable access to the underlying layout.
    fn layout_mut(&mut self) -> &mut ir::Layout;
    /// The current position.
    fn position(&self) -> CursorPosition;
    /// Set the current position.
    fn set_position(&mut self, pos: CursorPosition);

    /// Move to the top of `ebb`, before its first instruction.
    fn at_top(&mut self, ebb: Ebb) -> &mut Self {
        self.set_position(CursorPosition::Before(ebb));
        self
    }

    /// Move to the bottom of `ebb`, after its last instruction (the insertion point for a
    /// new terminator, or for appending to an as-yet-empty block).
    fn at_bottom(&mut self, ebb: Ebb) -> &mut Self {
        self.set_position(CursorPosition::After(ebb));
        self
    }

    /// Move to immediately after `inst`.
    fn goto_after_inst(&mut self, inst: Inst) -> &mut Self {
        self.set_position(CursorPosition::At(inst));
        self
    }

    /// Move to immediately before `inst` (inserting before it).
    fn goto_before_inst(&mut self, inst: Inst) -> &mut Self {
        match self.layout().prev_inst(inst) {
            Some(prev) => self.set_position(CursorPosition::At(prev)),
            None => {
                let ebb = self
                    .layout()
                    .inst_ebb(inst)
                    .expect("instruction not in layout");
                self.set_position(CursorPosition::Before(ebb));
            }
        }
        self
    }

    /// The block the cursor is currently positioned within, if any.
    fn current_ebb(&self) -> Option<Ebb> {
        match self.position() {
            CursorPosition::Nowhere => None,
            CursorPosition::Before(ebb) | CursorPosition::After(ebb) => Some(ebb),
            CursorPosition::At(inst) => self.layout().inst_ebb(inst),
        }
    }

    /// The instruction the cursor currently sits on top of, if any.
    fn current_inst(&self) -> Option<Inst> {
        match self.position() {
            CursorPosition::At(inst) => Some(inst),
            _ => None,
        }
    }

    /// Advance to the next instruction in the current block, returning it.
    fn next_inst(&mut self) -> Option<Inst> {
        let next = match self.position() {
            CursorPosition::Nowhere | CursorPosition::After(..) => None,
            CursorPosition::Before(ebb) => self.layout().first_inst(ebb),
            CursorPosition::At(inst) => self.layout().next_inst(inst),
        };
        match next {
            Some(inst) => self.set_position(CursorPosition::At(inst)),
            None => {
                if let Some(ebb) = self.current_ebb() {
                    self.set_position(CursorPosition::After(ebb));
                }
            }
        }
        next
    }

    /// Insert `inst` at the current position, and advance so the cursor still sits
    /// immediately after it (so repeated inserts append in order).
    fn insert_inst(&mut self, inst: Inst) {
        match self.position() {
            CursorPosition::Nowhere => panic!("cursor is not positioned"),
            CursorPosition::At(at) => self.layout_mut().insert_inst_after(inst, at),
            CursorPosition::Before(ebb) => match self.layout().first_inst(ebb) {
                Some(first) => self.layout_mut().insert_inst_before(inst, first),
                None => self.layout_mut().append_inst(inst, ebb),
            },
            CursorPosition::After(ebb) => self.layout_mut().append_inst(inst, ebb),
        }
        self.set_position(CursorPosition::At(inst));
    }
}

/// A cursor over an `ir::Function`'s layout, used by the SSA builder and the lowering stage
/// to append and splice instructions.
pub struct FuncCursor<'f> {
    pos: CursorPosition,
    func: &'f mut ir::Function,
}

impl<'f> FuncCursor<'f> {
    /// A new cursor over `func`, positioned nowhere.
    pub fn new(func: &'f mut ir::Function) -> Self {
        Self {
            pos: CursorPosition::Nowhere,
            func,
        }
    }

    /// Shared access to the function.
    pub fn func(&self) -> &ir::Function {
        self.func
    }

    /// Mutable access to the function.
    pub fn func_mut(&mut self) -> &mut ir::Function {
        self.func
    }
}

impl<'f> Cursor for FuncCursor<'f> {
    fn layout(&self) -> &ir::Layout {
        &self.func.layout
    }

    fn layout_mut(&mut self) -> &mut ir::Layout {
        &mut self.func.layout
    }

    fn position(&self) -> CursorPosition {
        self.pos
    }

    fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, InstructionData};

    #[test]
    fn append_via_cursor() {
        let mut func = Function::new();
        let ebb0 = func.dfg.make_ebb();
        func.layout.append_ebb(ebb0);
        let mut pos = FuncCursor::new(&mut func);
        pos.at_bottom(ebb0);
        let ret = pos.func.dfg.make_inst(InstructionData::Return { args: std::vec::Vec::new() });
        pos.insert_inst(ret);
        assert_eq!(
            func.layout.ebb_insts(ebb0).collect::<std::vec::Vec<_>>(),
            [ret]
        );
    }
}
