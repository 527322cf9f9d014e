//! Function Definitions
//!
//! A function is the arena owning its blocks, and through them its values.
//! Blocks are addressed by `BlockId`; `layout` keeps insertion order for
//! traversal and display. The function's `IdAllocator` hands out every
//! block and value id, so ids are never shared with another function.

use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use zir_common::{BlockId, IdAllocator, ValueId, ZirError};
use crate::{BasicBlock, IrType, PhiIncoming, Value, ValueKind};

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: IrType,
}

/// Function in IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub(crate) name: String,
    pub(crate) return_type: IrType,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) blocks: BTreeMap<BlockId, BasicBlock>,
    pub(crate) layout: Vec<BlockId>,
    pub(crate) entry: Option<BlockId>,
    pub(crate) ids: IdAllocator,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: IrType) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameters: Vec::new(),
            blocks: BTreeMap::new(),
            layout: Vec::new(),
            entry: None,
            ids: IdAllocator::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> &IrType {
        &self.return_type
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, ty: IrType) -> Result<(), ZirError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ZirError::EmptyName("parameter"));
        }
        self.parameters.push(Parameter { name, ty });
        Ok(())
    }

    // ===== Blocks =====

    /// Create an empty block. The first block created becomes the entry.
    pub fn create_block(&mut self, label: impl Into<String>) -> Result<BlockId, ZirError> {
        let label = label.into();
        self.check_label(&label)?;

        let id = self.ids.next_block();
        self.blocks.insert(id, BasicBlock::new(id, label));
        self.layout.push(id);
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        Ok(id)
    }

    fn check_label(&self, label: &str) -> Result<(), ZirError> {
        if label.is_empty() {
            return Err(ZirError::EmptyName("label"));
        }
        if self.block_by_label(label).is_some() {
            return Err(ZirError::DuplicateLabel(label.to_string()));
        }
        Ok(())
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.entry.and_then(|id| self.blocks.get(&id))
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    pub fn block_by_label(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.values().find(|b| b.label() == label)
    }

    /// Block ids in insertion order
    pub fn block_ids(&self) -> &[BlockId] {
        &self.layout
    }

    /// Blocks in insertion order
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.layout.iter().filter_map(|id| self.blocks.get(id))
    }

    pub fn num_blocks(&self) -> usize {
        self.layout.len()
    }

    pub fn label_of(&self, id: BlockId) -> Option<&str> {
        self.blocks.get(&id).map(BasicBlock::label)
    }

    pub fn predecessors_of(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .get(&id)
            .map(|b| b.predecessors().iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn successors_of(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .get(&id)
            .map(|b| b.successors().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Detach a block: drop all of its edges and take it out of the arena.
    ///
    /// Removing the entry block promotes the next block in layout order.
    pub fn remove_block(&mut self, id: BlockId) -> Option<BasicBlock> {
        if !self.blocks.contains_key(&id) {
            return None;
        }
        self.disconnect(id);
        self.layout.retain(|b| *b != id);
        if self.entry == Some(id) {
            self.entry = self.layout.first().copied();
        }
        trace!("removed block {id} from '{}'", self.name);
        self.blocks.remove(&id)
    }

    fn disconnect(&mut self, id: BlockId) {
        for pred in self.predecessors_of(id) {
            self.remove_successor(pred, id);
        }
        for succ in self.successors_of(id) {
            self.remove_successor(id, succ);
        }
    }

    /// Replace `removed` blocks with a detached block.
    ///
    /// The new block takes the layout slot of the earliest removed block;
    /// its recorded predecessor and successor sets become real edges. If the
    /// entry is among the removed blocks, the new block becomes the entry.
    pub fn replace_blocks(&mut self, removed: &[BlockId], block: BasicBlock) -> Result<(), ZirError> {
        for id in removed {
            if !self.blocks.contains_key(id) {
                return Err(ZirError::UnknownBlock(*id));
            }
        }
        let new_id = block.id();
        if self.blocks.contains_key(&new_id) && !removed.contains(&new_id) {
            return Err(ZirError::internal(format!("block {new_id} already exists")));
        }
        if self
            .blocks
            .values()
            .any(|b| b.label() == block.label() && !removed.contains(&b.id()))
        {
            return Err(ZirError::DuplicateLabel(block.label().to_string()));
        }

        let slot = self
            .layout
            .iter()
            .position(|b| removed.contains(b))
            .unwrap_or(self.layout.len());
        let entry_replaced = self.entry.is_some_and(|e| removed.contains(&e));

        for id in removed {
            self.disconnect(*id);
            self.blocks.remove(id);
        }
        self.layout.retain(|b| !removed.contains(b));

        self.install_block(block, slot.min(self.layout.len()));
        if entry_replaced || self.entry.is_none() {
            self.entry = Some(new_id);
        }
        Ok(())
    }

    /// Insert a detached block into the arena at a layout slot, turning its
    /// recorded edge sets into paired edges. Edges to unknown blocks are dropped.
    fn install_block(&mut self, mut block: BasicBlock, slot: usize) {
        let id = block.id();
        let preds = std::mem::take(&mut block.predecessors);
        let succs = std::mem::take(&mut block.successors);
        self.blocks.insert(id, block);
        self.layout.insert(slot, id);

        for pred in preds {
            self.add_successor(pred, id);
        }
        for succ in succs {
            self.add_successor(id, succ);
        }
    }

    // ===== Values =====

    /// Look up a value anywhere in the function
    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.blocks().find_map(|b| b.value(id))
    }

    pub fn contains_value(&self, id: ValueId) -> bool {
        self.value(id).is_some()
    }

    /// Block holding the value
    pub fn value_block(&self, id: ValueId) -> Option<BlockId> {
        self.blocks().find(|b| b.value(id).is_some()).map(BasicBlock::id)
    }

    /// All values in layout order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.blocks().flat_map(|b| b.instructions().iter())
    }

    fn check_operands(&self, kind: &ValueKind) -> Result<(), ZirError> {
        for operand in kind.operands() {
            if !self.contains_value(operand) {
                return Err(ZirError::UnknownValue(operand));
            }
        }
        for target in kind.block_refs() {
            if !self.contains_block(target) {
                return Err(ZirError::UnknownBlock(target));
            }
        }
        match kind {
            ValueKind::Call { callee, .. } if callee.is_empty() => Err(ZirError::EmptyName("callee")),
            ValueKind::Local { name } if name.is_empty() => Err(ZirError::EmptyName("local")),
            _ => Ok(()),
        }
    }

    /// Comptime flag of a new value: constants are comptime, derived values
    /// are comptime iff every operand is.
    fn comptime_of(&self, kind: &ValueKind) -> bool {
        match kind {
            ValueKind::Const(_) => true,
            ValueKind::Binary { .. }
            | ValueKind::Unary { .. }
            | ValueKind::Call { .. }
            | ValueKind::Convert { .. }
            | ValueKind::Phi { .. } => kind
                .operands()
                .iter()
                .all(|op| self.value(*op).is_some_and(Value::is_comptime)),
            _ => false,
        }
    }

    /// Append a value to a block.
    ///
    /// Phis are placed after the block's leading phis, so they may still be
    /// added to a finished block; everything else goes at the end and is
    /// rejected once the block has a terminator. A Branch or Jump creates the
    /// block's successor edges.
    pub fn append(&mut self, block: BlockId, ty: IrType, kind: ValueKind) -> Result<ValueId, ZirError> {
        let target = self.blocks.get(&block).ok_or(ZirError::UnknownBlock(block))?;
        if target.has_terminator() && !kind.is_phi() {
            return Err(ZirError::TerminatorAlreadyPresent(block));
        }
        self.check_operands(&kind)?;

        let is_comptime = self.comptime_of(&kind);
        let id = self.ids.next_value();
        let targets = kind.block_targets();
        let value = Value::new(id, ty, is_comptime, kind);

        let bb = self.blocks.get_mut(&block).ok_or(ZirError::UnknownBlock(block))?;
        if value.is_phi() {
            let at = bb.phi_insertion_point();
            bb.instructions.insert(at, value);
        } else {
            bb.instructions.push(value);
        }

        for succ in targets {
            self.add_successor(block, succ);
        }
        Ok(id)
    }

    /// Complete a phi with one more incoming pair
    pub fn add_phi_incoming(&mut self, phi: ValueId, pred: BlockId, value: ValueId) -> Result<(), ZirError> {
        if !self.contains_block(pred) {
            return Err(ZirError::UnknownBlock(pred));
        }
        let incoming_comptime = self
            .value(value)
            .ok_or(ZirError::UnknownValue(value))?
            .is_comptime();

        let block = self.value_block(phi).ok_or(ZirError::UnknownValue(phi))?;
        let bb = self.blocks.get_mut(&block).ok_or(ZirError::UnknownBlock(block))?;
        let pos = bb.position(phi).ok_or(ZirError::UnknownValue(phi))?;

        let current = &bb.instructions[pos];
        let ValueKind::Phi { incoming } = current.kind() else {
            return Err(ZirError::NotAPhi(phi));
        };
        let mut incoming = incoming.clone();
        incoming.push(PhiIncoming { block: pred, value });
        let mut rebuilt = current.with_kind(ValueKind::Phi { incoming });
        rebuilt.set_comptime(current.is_comptime() && incoming_comptime);
        bb.instructions[pos] = rebuilt;
        Ok(())
    }

    /// Swap a block's terminator for a new one under a fresh id, moving the
    /// successor edges from the old targets to the new ones.
    pub fn replace_terminator(&mut self, block: BlockId, ty: IrType, kind: ValueKind) -> Result<ValueId, ZirError> {
        if !kind.is_terminator() {
            return Err(ZirError::internal(format!("{} is not a terminator", kind.opcode())));
        }
        let bb = self.blocks.get_mut(&block).ok_or(ZirError::UnknownBlock(block))?;
        if !bb.has_terminator() {
            return Err(ZirError::MissingTerminator(block));
        }
        let old = bb.instructions.pop().ok_or(ZirError::MissingTerminator(block))?;

        for succ in old.kind().block_targets() {
            self.remove_successor(block, succ);
        }
        match self.append(block, ty, kind) {
            Ok(id) => Ok(id),
            Err(err) => {
                // Put the old terminator back so a rejected replacement is a no-op
                let targets = old.kind().block_targets();
                if let Some(bb) = self.blocks.get_mut(&block) {
                    bb.instructions.push(old);
                }
                for succ in targets {
                    self.add_successor(block, succ);
                }
                Err(err)
            }
        }
    }

    /// Remove a single value. Removing a terminator drops its edges.
    pub fn remove_value(&mut self, id: ValueId) -> Option<Value> {
        let block = self.value_block(id)?;
        let bb = self.blocks.get_mut(&block)?;
        let pos = bb.position(id)?;
        let value = bb.instructions.remove(pos);
        if value.is_terminator() {
            for succ in value.kind().block_targets() {
                self.remove_successor(block, succ);
            }
        }
        Some(value)
    }

    /// Rewrite every operand `old` to `new`. Returns the number of values rewritten.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> usize {
        let mut rewritten = 0;
        for bb in self.blocks.values_mut() {
            for instr in bb.instructions.iter_mut() {
                if instr.kind().operands().contains(&old) {
                    let kind = instr.kind().map_operands(|op| if op == old { new } else { op });
                    *instr = instr.with_kind(kind);
                    rewritten += 1;
                }
            }
        }
        rewritten
    }

    /// Rename predecessor `old_pred` to `new_pred` in the phis of `block`.
    pub fn retarget_phi_incoming(&mut self, block: BlockId, old_pred: BlockId, new_pred: BlockId) -> usize {
        let Some(bb) = self.blocks.get_mut(&block) else {
            return 0;
        };
        let mut rewritten = 0;
        for instr in bb.instructions.iter_mut().filter(|i| i.is_phi()) {
            if instr.kind().block_refs().contains(&old_pred) {
                let kind = instr.kind().map_blocks(|b| if b == old_pred { new_pred } else { b });
                *instr = instr.with_kind(kind);
                rewritten += 1;
            }
        }
        rewritten
    }

    /// Drop the incoming pairs naming `pred` from the phis of `block`.
    pub fn remove_phi_incoming(&mut self, block: BlockId, pred: BlockId) -> usize {
        let Some(bb) = self.blocks.get_mut(&block) else {
            return 0;
        };
        let mut removed = 0;
        for instr in bb.instructions.iter_mut() {
            if let ValueKind::Phi { incoming } = instr.kind() {
                let kept: Vec<PhiIncoming> = incoming.iter().copied().filter(|inc| inc.block != pred).collect();
                if kept.len() != incoming.len() {
                    removed += incoming.len() - kept.len();
                    *instr = instr.with_kind(ValueKind::Phi { incoming: kept });
                }
            }
        }
        removed
    }

    /// Total number of CFG edges
    pub fn edge_count(&self) -> usize {
        self.blocks.values().map(|b| b.successors().len()).sum()
    }

    /// Labels for a set of blocks, in id order; handy in logs and tests
    pub fn labels(&self, ids: &BTreeSet<BlockId>) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.label_of(*id))
            .map(str::to_string)
            .collect()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}: {}", param.name, param.ty)?;
        }
        writeln!(f, ") -> {} {{", self.return_type)?;
        for block in self.blocks() {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}
