//! CFG edge tracker
//!
//! The only code allowed to write predecessor/successor sets. Every edge is
//! added and removed as a pair, so `B ∈ succ(A) ⇔ A ∈ pred(B)` holds after
//! any call. Ids that do not name a block of the function are ignored; no
//! reachability or ownership validation happens here.

use log::trace;
use zir_common::BlockId;
use crate::Function;

impl Function {
    /// Add the edge `from → to`. Idempotent.
    pub fn add_successor(&mut self, from: BlockId, to: BlockId) {
        if !self.contains_block(from) || !self.contains_block(to) {
            return;
        }
        if let Some(block) = self.blocks.get_mut(&from) {
            block.successors.insert(to);
        }
        if let Some(block) = self.blocks.get_mut(&to) {
            block.predecessors.insert(from);
        }
        trace!("edge {from} -> {to}");
    }

    /// Add `pred` as a predecessor of `block`, i.e. the edge `pred → block`.
    pub fn add_predecessor(&mut self, block: BlockId, pred: BlockId) {
        self.add_successor(pred, block);
    }

    /// Remove the edge `from → to` if present. Returns whether it existed.
    pub fn remove_successor(&mut self, from: BlockId, to: BlockId) -> bool {
        if !self.has_successor(from, to) {
            return false;
        }
        if let Some(block) = self.blocks.get_mut(&from) {
            block.successors.remove(&to);
        }
        if let Some(block) = self.blocks.get_mut(&to) {
            block.predecessors.remove(&from);
        }
        trace!("removed edge {from} -> {to}");
        true
    }

    /// Remove `pred` from the predecessors of `block`, i.e. the edge `pred → block`.
    pub fn remove_predecessor(&mut self, block: BlockId, pred: BlockId) -> bool {
        self.remove_successor(pred, block)
    }

    pub fn has_successor(&self, from: BlockId, to: BlockId) -> bool {
        self.blocks
            .get(&from)
            .is_some_and(|b| b.successors.contains(&to))
    }

    pub fn has_predecessor(&self, block: BlockId, pred: BlockId) -> bool {
        self.blocks
            .get(&block)
            .is_some_and(|b| b.predecessors.contains(&pred))
    }
}
