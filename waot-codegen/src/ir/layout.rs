//! The layout: an ordered, doubly-linked arrangement of blocks and instructions.
//!
//! Two ordering concerns live here and nowhere else: the order of blocks in the function
//! (which `LayoutBlocks`, see `ir::layout::Layout::set_ebb_order`, may later linearize for
//! fall-through) and the order of instructions within each block. Both are doubly-linked
//! lists threaded through a flat arena (`waot_entity::SecondaryMap`) using entity references
//! as the "pointers" (see SPEC_FULL.md section 9's design note on why: the whole structure
//! is then freed in one shot by truncating the arena, with no owned-pointer graph to tear
//! down node by node).

use waot_entity::{PackedOption, SecondaryMap};

use crate::ir::entities::{Ebb, Inst};

#[derive(Clone, Copy, Default)]
struct EbbNode {
    prev: PackedOption<Ebb>,
    next: PackedOption<Ebb>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
}

#[derive(Clone, Copy, Default)]
struct InstNode {
    ebb: PackedOption<Ebb>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
}

/// The ordered arrangement of a function's blocks and instructions.
#[derive(Clone, Default)]
pub struct Layout {
    ebbs: SecondaryMap<Ebb, EbbNode>,
    insts: SecondaryMap<Inst, InstNode>,
    first_ebb: PackedOption<Ebb>,
    last_ebb: PackedOption<Ebb>,
}

impl Layout {
    /// An empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data, keeping storage capacity.
    pub fn clear(&mut self) {
        self.ebbs.clear();
        self.insts.clear();
        self.first_ebb = None.into();
        self.last_ebb = None.into();
    }

    /// The function's entry block, if any instructions have been laid out.
    pub fn entry_block(&self) -> Option<Ebb> {
        self.first_ebb.expand()
    }

    /// Is `ebb` present in the layout?
    pub fn is_ebb_inserted(&self, ebb: Ebb) -> bool {
        Some(ebb) == self.first_ebb.expand() || self.ebbs[ebb].prev.is_some() || self.ebbs[ebb].next.is_some()
    }

    /// Append `ebb` to the end of the block order.
    pub fn append_ebb(&mut self, ebb: Ebb) {
        {
            let node = &mut self.ebbs[ebb];
            debug_assert!(node.prev.is_none() && node.next.is_none());
            node.prev = self.last_ebb;
        }
        match self.last_ebb.expand() {
            Some(prev) => self.ebbs[prev].next = ebb.into(),
            None => self.first_ebb = ebb.into(),
        }
        self.last_ebb = ebb.into();
    }

    /// Iterate over blocks in layout order.
    pub fn ebbs(&self) -> Ebbs {
        Ebbs {
            layout: self,
            next: self.first_ebb.expand(),
        }
    }

    /// The block after `ebb` in layout order.
    pub fn next_ebb(&self, ebb: Ebb) -> Option<Ebb> {
        self.ebbs[ebb].next.expand()
    }

    /// The block before `ebb` in layout order.
    pub fn prev_ebb(&self, ebb: Ebb) -> Option<Ebb> {
        self.ebbs[ebb].prev.expand()
    }

    /// Move `ebb` to immediately after `after` in the block order (used by `LayoutBlocks` to
    /// favor fall-through on the more likely successor of a conditional branch).
    pub fn move_ebb_after(&mut self, ebb: Ebb, after: Ebb) {
        debug_assert_ne!(ebb, after);
        self.unlink_ebb(ebb);
        let next = self.ebbs[after].next;
        self.ebbs[ebb].prev = after.into();
        self.ebbs[ebb].next = next;
        self.ebbs[after].next = ebb.into();
        match next.expand() {
            Some(n) => self.ebbs[n].prev = ebb.into(),
            None => self.last_ebb = ebb.into(),
        }
    }

    fn unlink_ebb(&mut self, ebb: Ebb) {
        let (prev, next) = {
            let node = &self.ebbs[ebb];
            (node.prev, node.next)
        };
        match prev.expand() {
            Some(p) => self.ebbs[p].next = next,
            None => self.first_ebb = next,
        }
        match next.expand() {
            Some(n) => self.ebbs[n].prev = prev,
            None => self.last_ebb = prev,
        }
        self.ebbs[ebb].prev = None.into();
        self.ebbs[ebb].next = None.into();
    }

    /// Append `inst` to the end of `ebb`.
    pub fn append_inst(&mut self, inst: Inst, ebb: Ebb) {
        {
            let node = &mut self.insts[inst];
            debug_assert!(node.ebb.is_none());
            node.ebb = ebb.into();
        }
        let last = self.ebbs[ebb].last_inst;
        self.insts[inst].prev = last;
        match last.expand() {
            Some(prev) => self.insts[prev].next = inst.into(),
            None => self.ebbs[ebb].first_inst = inst.into(),
        }
        self.ebbs[ebb].last_inst = inst.into();
    }

    /// Insert `inst` immediately before `before` in `before`'s block.
    pub fn insert_inst_before(&mut self, inst: Inst, before: Inst) {
        let ebb = self.insts[before].ebb.expand().expect("instruction not in layout");
        let prev = self.insts[before].prev;
        self.insts[inst].ebb = ebb.into();
        self.insts[inst].prev = prev;
        self.insts[inst].next = before.into();
        self.insts[before].prev = inst.into();
        match prev.expand() {
            Some(p) => self.insts[p].next = inst.into(),
            None => self.ebbs[ebb].first_inst = inst.into(),
        }
    }

    /// Insert `inst` immediately after `after` in `after`'s block.
    pub fn insert_inst_after(&mut self, inst: Inst, after: Inst) {
        let ebb = self.insts[after].ebb.expand().expect("instruction not in layout");
        let next = self.insts[after].next;
        self.insts[inst].ebb = ebb.into();
        self.insts[inst].prev = after.into();
        self.insts[inst].next = next;
        self.insts[after].next = inst.into();
        match next.expand() {
            Some(n) => self.insts[n].prev = inst.into(),
            None => self.ebbs[ebb].last_inst = inst.into(),
        }
    }

    /// Remove `inst` from the layout; it remains a valid key into the data-flow graph but no
    /// longer participates in iteration.
    pub fn remove_inst(&mut self, inst: Inst) {
        let ebb = self.insts[inst].ebb.expand().expect("instruction not in layout");
        let (prev, next) = {
            let node = &self.insts[inst];
            (node.prev, node.next)
        };
        match prev.expand() {
            Some(p) => self.insts[p].next = next,
            None => self.ebbs[ebb].first_inst = next,
        }
        match next.expand() {
            Some(n) => self.insts[n].prev = prev,
            None => self.ebbs[ebb].last_inst = prev,
        }
        self.insts[inst] = InstNode::default();
    }

    /// The block containing `inst`, if it is currently laid out.
    pub fn inst_ebb(&self, inst: Inst) -> Option<Ebb> {
        self.insts[inst].ebb.expand()
    }

    /// The first instruction of `ebb`.
    pub fn first_inst(&self, ebb: Ebb) -> Option<Inst> {
        self.ebbs[ebb].first_inst.expand()
    }

    /// The last instruction of `ebb` (its terminator, for a well-formed block).
    pub fn last_inst(&self, ebb: Ebb) -> Option<Inst> {
        self.ebbs[ebb].last_inst.expand()
    }

    /// The instruction after `inst` within its block.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    /// The instruction before `inst` within its block.
    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Iterate over the instructions of `ebb` in layout order.
    pub fn ebb_insts(&self, ebb: Ebb) -> Insts {
        Insts {
            layout: self,
            next: self.ebbs[ebb].first_inst.expand(),
        }
    }
}

/// Iterator over blocks in layout order.
pub struct Ebbs<'f> {
    layout: &'f Layout,
    next: Option<Ebb>,
}

impl<'f> Iterator for Ebbs<'f> {
    type Item = Ebb;

    fn next(&mut self) -> Option<Ebb> {
        let ebb = self.next?;
        self.next = self.layout.next_ebb(ebb);
        Some(ebb)
    }
}

/// Iterator over the instructions of a block in layout order.
pub struct Insts<'f> {
    layout: &'f Layout,
    next: Option<Inst>,
}

impl<'f> Iterator for Insts<'f> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let inst = self.next?;
        self.next = self.layout.next_inst(inst);
        Some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waot_entity::EntityRef;

    #[test]
    fn append_and_iterate() {
        let mut l = Layout::new();
        let ebb0 = Ebb::new(0);
        let ebb1 = Ebb::new(1);
        l.append_ebb(ebb0);
        l.append_ebb(ebb1);
        assert_eq!(l.ebbs().collect::<std::vec::Vec<_>>(), [ebb0, ebb1]);

        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        l.append_inst(i0, ebb0);
        l.append_inst(i1, ebb0);
        assert_eq!(l.ebb_insts(ebb0).collect::<std::vec::Vec<_>>(), [i0, i1]);
        assert_eq!(l.entry_block(), Some(ebb0));
    }

    #[test]
    fn insert_before_and_remove() {
        let mut l = Layout::new();
        let ebb0 = Ebb::new(0);
        l.append_ebb(ebb0);
        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);
        l.append_inst(i0, ebb0);
        l.append_inst(i2, ebb0);
        l.insert_inst_before(i1, i2);
        assert_eq!(l.ebb_insts(ebb0).collect::<std::vec::Vec<_>>(), [i0, i1, i2]);

        l.remove_inst(i1);
        assert_eq!(l.ebb_insts(ebb0).collect::<std::vec::Vec<_>>(), [i0, i2]);
    }
}
