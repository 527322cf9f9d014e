//! Basic Block Management
//!
//! Defines basic blocks - sequences of instructions with single entry/exit points.
//! Predecessor and successor sets are derived data: only the edge tracker in
//! `cfg` writes them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use zir_common::{BlockId, ValueId};
use crate::Value;

/// Basic Block - a sequence of instructions with a single entry and exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    id: BlockId,
    label: String,
    pub(crate) instructions: Vec<Value>,
    pub(crate) predecessors: BTreeSet<BlockId>,
    pub(crate) successors: BTreeSet<BlockId>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, label: String) -> Self {
        Self {
            id,
            label,
            instructions: Vec::new(),
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
        }
    }

    /// A detached block carrying the given instructions and intended edges.
    ///
    /// The edge sets are only a record until `Function::install_block`
    /// turns them into real, paired edges.
    pub fn detached(
        id: BlockId,
        label: String,
        instructions: Vec<Value>,
        predecessors: BTreeSet<BlockId>,
        successors: BTreeSet<BlockId>,
    ) -> Self {
        Self { id, label, instructions, predecessors, successors }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn instructions(&self) -> &[Value] {
        &self.instructions
    }

    pub fn predecessors(&self) -> &BTreeSet<BlockId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &BTreeSet<BlockId> {
        &self.successors
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn has_terminator(&self) -> bool {
        self.instructions.last().is_some_and(Value::is_terminator)
    }

    pub fn terminator(&self) -> Option<&Value> {
        self.instructions.last().filter(|instr| instr.is_terminator())
    }

    /// Instructions without the trailing terminator
    pub fn body(&self) -> &[Value] {
        if self.has_terminator() {
            &self.instructions[..self.instructions.len() - 1]
        } else {
            &self.instructions
        }
    }

    pub fn has_phi(&self) -> bool {
        self.instructions.iter().any(Value::is_phi)
    }

    pub fn phis(&self) -> impl Iterator<Item = &Value> {
        self.instructions.iter().filter(|instr| instr.is_phi())
    }

    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.instructions.iter().find(|instr| instr.id() == id)
    }

    pub(crate) fn position(&self, id: ValueId) -> Option<usize> {
        self.instructions.iter().position(|instr| instr.id() == id)
    }

    /// Index where a new phi goes: after the existing leading phis
    pub(crate) fn phi_insertion_point(&self) -> usize {
        self.instructions.iter().take_while(|instr| instr.is_phi()).count()
    }

    /// Whether any instruction names `other` (branch target or phi predecessor)
    pub fn references_block(&self, other: BlockId) -> bool {
        self.instructions
            .iter()
            .any(|instr| instr.kind().block_refs().contains(&other))
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}):", self.label, self.id)?;
        if !self.predecessors.is_empty() {
            write!(f, "  ; preds:")?;
            for pred in &self.predecessors {
                write!(f, " {pred}")?;
            }
        }
        writeln!(f)?;
        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}
