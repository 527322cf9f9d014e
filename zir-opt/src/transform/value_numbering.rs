//! Value numbering
//!
//! Pure values (constants, arithmetic, conversions) are keyed by their
//! opcode, result type, literal payload and the value numbers of their
//! operands. Two values with equal keys compute the same thing; every other
//! value gets a number of its own.

use log::debug;
use std::collections::HashMap;
use zir_common::{BlockId, ValueId};
use zir_ir::{BasicBlock, BinaryOp, Constant, Function, IrType, UnaryOp, Value, ValueKind};
use crate::dominance::{reverse_postorder, DominanceInfo};

/// Literal payload in hashable form; floats compare by bit pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Literal {
    Int(i64),
    Float(u64),
    Bool(bool),
}

impl From<Constant> for Literal {
    fn from(constant: Constant) -> Self {
        match constant {
            Constant::Int(v) => Literal::Int(v),
            Constant::Float(v) => Literal::Float(v.to_bits()),
            Constant::Bool(v) => Literal::Bool(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ExprKey {
    Const { ty: IrType, literal: Literal },
    Binary { ty: IrType, op: BinaryOp, lhs: u32, rhs: u32 },
    Unary { ty: IrType, op: UnaryOp, operand: u32 },
    Convert { ty: IrType, operand: u32 },
}

/// A value computing the same thing as an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Redundancy {
    pub value: ValueId,
    pub original: ValueId,
}

/// Numbering state of one scan
#[derive(Debug, Default)]
pub struct ValueNumbering {
    numbers: HashMap<ValueId, u32>,
    expressions: HashMap<ExprKey, Vec<(BlockId, ValueId)>>,
    next: u32,
}

impl ValueNumbering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of a value, assigning a fresh one on first sight
    pub fn number_of(&mut self, value: ValueId) -> u32 {
        if let Some(&n) = self.numbers.get(&value) {
            return n;
        }
        let n = self.next;
        self.next += 1;
        self.numbers.insert(value, n);
        n
    }

    fn key(&mut self, value: &Value) -> Option<ExprKey> {
        let ty = value.ty().clone();
        let key = match value.kind() {
            ValueKind::Const(c) => ExprKey::Const { ty, literal: Literal::from(*c) },
            ValueKind::Binary { op, lhs, rhs } => ExprKey::Binary {
                ty,
                op: *op,
                lhs: self.number_of(*lhs),
                rhs: self.number_of(*rhs),
            },
            ValueKind::Unary { op, operand } => ExprKey::Unary { ty, op: *op, operand: self.number_of(*operand) },
            ValueKind::Convert { operand } => ExprKey::Convert { ty, operand: self.number_of(*operand) },
            _ => return None,
        };
        Some(key)
    }

    /// Number `value`, found in `block`. Returns the earlier equal value when
    /// one is available, as decided by `available(earlier_block)`.
    fn visit(&mut self, value: &Value, block: BlockId, available: impl Fn(BlockId) -> bool) -> Option<ValueId> {
        let Some(key) = self.key(value) else {
            self.number_of(value.id());
            return None;
        };
        let earlier = self
            .expressions
            .get(&key)
            .and_then(|seen| seen.iter().find(|(b, _)| available(*b)).map(|(_, v)| *v));
        match earlier {
            Some(original) => {
                let n = self.number_of(original);
                self.numbers.insert(value.id(), n);
                Some(original)
            }
            None => {
                self.number_of(value.id());
                self.expressions.entry(key).or_default().push((block, value.id()));
                None
            }
        }
    }
}

/// Redundant values within one block
pub fn local_value_numbering(block: &BasicBlock) -> Vec<Redundancy> {
    let mut numbering = ValueNumbering::new();
    block
        .instructions()
        .iter()
        .filter_map(|value| {
            numbering
                .visit(value, block.id(), |_| true)
                .map(|original| Redundancy { value: value.id(), original })
        })
        .collect()
}

/// Redundant values across the whole function, each paired with the first
/// equal value seen. Reachable blocks are scanned in reverse postorder, then
/// the rest in layout order. Nothing is rewritten.
pub fn global_value_numbering(function: &Function) -> Vec<Redundancy> {
    let mut order = reverse_postorder(function);
    let rest: Vec<BlockId> = function
        .block_ids()
        .iter()
        .copied()
        .filter(|b| !order.contains(b))
        .collect();
    order.extend(rest);

    let mut numbering = ValueNumbering::new();
    let mut found = Vec::new();
    for block in order.iter().filter_map(|id| function.block(*id)) {
        for value in block.instructions() {
            if let Some(original) = numbering.visit(value, block.id(), |_| true) {
                found.push(Redundancy { value: value.id(), original });
            }
        }
    }
    found
}

fn eliminate(function: &mut Function, redundancies: &[Redundancy]) -> usize {
    for r in redundancies {
        function.replace_all_uses(r.value, r.original);
        function.remove_value(r.value);
    }
    redundancies.len()
}

/// Replace each value with an equal earlier value of the same block.
/// Returns the number of values removed.
pub fn eliminate_local_redundancies(function: &mut Function) -> usize {
    let redundancies: Vec<Redundancy> = function.blocks().flat_map(local_value_numbering).collect();
    let removed = eliminate(function, &redundancies);
    if removed > 0 {
        debug!("removed {removed} locally redundant value(s) from '{}'", function.name());
    }
    removed
}

/// Replace each value with an equal value whose block dominates it.
/// Returns the number of values removed.
pub fn eliminate_dominated_redundancies(function: &mut Function, dom: &DominanceInfo) -> usize {
    let mut numbering = ValueNumbering::new();
    let mut redundancies = Vec::new();
    for block in dom.reverse_postorder().iter().filter_map(|id| function.block(*id)) {
        let here = block.id();
        for value in block.instructions() {
            if let Some(original) = numbering.visit(value, here, |earlier| dom.dominates(earlier, here)) {
                redundancies.push(Redundancy { value: value.id(), original });
            }
        }
    }
    let removed = eliminate(function, &redundancies);
    if removed > 0 {
        debug!("removed {removed} dominated redundant value(s) from '{}'", function.name());
    }
    removed
}
