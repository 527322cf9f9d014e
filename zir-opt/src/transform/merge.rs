//! Block merging
//!
//! A block A merges with its only successor B when B has no other
//! predecessor. The merged block keeps A's id and label, carries A's body
//! followed by all of B, and inherits A's predecessors and B's successors.

use log::{debug, trace};
use std::collections::{BTreeSet, HashSet};
use zir_common::{BlockId, ValueId};
use zir_ir::{BasicBlock, Function, Value, ValueKind};
use crate::ssa::variable_of;
use super::critical_edges::is_critical_edge;

/// CFG shape check: A's only successor is B and B's only predecessor is A
pub fn is_mergeable(function: &Function, a: BlockId, b: BlockId) -> bool {
    if a == b || function.entry() == Some(b) {
        return false;
    }
    let (Some(block_a), Some(block_b)) = (function.block(a), function.block(b)) else {
        return false;
    };
    block_a.successors() == &BTreeSet::from([b])
        && block_b.predecessors() == &BTreeSet::from([a])
        && !is_critical_edge(function, a, b)
}

/// Content check for a mergeable pair
pub fn is_safe_to_merge(function: &Function, a: BlockId, b: BlockId) -> bool {
    let (Some(block_a), Some(block_b)) = (function.block(a), function.block(b)) else {
        return false;
    };

    if block_b.has_phi() {
        trace!("{b} has phis; not merging into {a}");
        return false;
    }
    if block_a.body().iter().any(Value::is_terminator) {
        return false;
    }
    let a_names_b = block_a.body().iter().any(|v| v.kind().block_refs().contains(&b));
    if a_names_b || block_b.references_block(a) {
        trace!("{a} and {b} reference each other; not merging");
        return false;
    }

    let stored_in_a = stored_variables(function, block_a.body());
    let stored_in_b = stored_variables(function, block_b.instructions());
    if let Some(name) = stored_in_a.intersection(&stored_in_b).next() {
        trace!("'{name}' is stored in both {a} and {b}; not merging");
        return false;
    }

    uses_follow_defs(block_a.body().iter().chain(block_b.instructions()))
}

fn stored_variables<'f>(function: &'f Function, values: &[Value]) -> BTreeSet<&'f str> {
    values
        .iter()
        .filter_map(|v| match v.kind() {
            ValueKind::Store { ptr, .. } => variable_of(function, *ptr),
            _ => None,
        })
        .collect()
}

/// No value in the sequence uses a value defined later in the same sequence
fn uses_follow_defs<'v>(sequence: impl Iterator<Item = &'v Value> + Clone) -> bool {
    let local: HashSet<ValueId> = sequence.clone().map(Value::id).collect();
    let mut defined = HashSet::new();
    for value in sequence {
        let early_use = value
            .kind()
            .operands()
            .into_iter()
            .any(|op| local.contains(&op) && !defined.contains(&op));
        if early_use {
            return false;
        }
        defined.insert(value.id());
    }
    true
}

/// Build the merged block without touching the function
pub fn try_merge_blocks(function: &Function, a: BlockId, b: BlockId) -> Option<BasicBlock> {
    if !is_mergeable(function, a, b) || !is_safe_to_merge(function, a, b) {
        return None;
    }
    let block_a = function.block(a)?;
    let block_b = function.block(b)?;

    let instructions: Vec<Value> = block_a
        .body()
        .iter()
        .chain(block_b.instructions())
        .cloned()
        .collect();
    Some(BasicBlock::detached(
        a,
        block_a.label().to_string(),
        instructions,
        block_a.predecessors().clone(),
        block_b.successors().clone(),
    ))
}

/// Install a block built by `try_merge_blocks(a, b)` in place of A and B.
/// Phis in B's successors that named B now name the merged block.
pub fn apply_merge(function: &mut Function, a: BlockId, b: BlockId, merged: BasicBlock) -> bool {
    let b_succs = function.successors_of(b);
    let merged_id = merged.id();
    if function.replace_blocks(&[a, b], merged).is_err() {
        return false;
    }
    for succ in b_succs {
        function.retarget_phi_incoming(succ, b, merged_id);
    }
    trace!("merged {b} into {a}");
    true
}

pub fn merge_blocks(function: &mut Function, a: BlockId, b: BlockId) -> bool {
    match try_merge_blocks(function, a, b) {
        Some(merged) => apply_merge(function, a, b, merged),
        None => false,
    }
}

/// Merge until no mergeable pair remains. Returns the number of merges.
pub fn merge_all_blocks(function: &mut Function) -> usize {
    let mut merges = 0;
    loop {
        let candidate = function.block_ids().iter().copied().find_map(|a| {
            let succs = function.successors_of(a);
            match succs.as_slice() {
                [b] if try_merge_blocks(function, a, *b).is_some() => Some((a, *b)),
                _ => None,
            }
        });
        let Some((a, b)) = candidate else {
            break;
        };
        if !merge_blocks(function, a, b) {
            break;
        }
        merges += 1;
    }
    if merges > 0 {
        debug!("merged {merges} block pair(s) in '{}'", function.name());
    }
    merges
}

#[cfg(test)]
mod tests {
    use super::*;
    use zir_ir::{BinaryOp, IrBuilder, IrType};

    #[test]
    fn test_use_before_def_is_unsafe() {
        let mut builder = IrBuilder::new();
        builder.create_function("f", IrType::Void);
        let a = builder.create_block("a").unwrap();
        let b = builder.create_block("b").unwrap();
        builder.position_at_end(a).unwrap();
        builder.build_jump(b).unwrap();
        builder.position_at_end(b).unwrap();
        builder.build_return(None).unwrap();
        let func = builder.finish_function().unwrap();

        let block = func.block(a).unwrap();
        assert!(uses_follow_defs(block.instructions().iter()));

        // A hand-ordered sequence where the add precedes its operand
        let mut builder = IrBuilder::new();
        builder.create_function("g", IrType::I32);
        let entry = builder.create_block("entry").unwrap();
        builder.position_at_end(entry).unwrap();
        let one = builder.build_int(1, IrType::I32).unwrap();
        let sum = builder.build_binary(BinaryOp::Add, one, one).unwrap();
        builder.build_return(Some(sum)).unwrap();
        let func = builder.finish_function().unwrap();
        let values = func.block(entry).unwrap().instructions();
        let reordered = [values[1].clone(), values[0].clone()];
        assert!(!uses_follow_defs(reordered.iter()));
    }

    #[test]
    fn test_self_merge_declined() {
        let mut func = Function::new("f", IrType::Void);
        let a = func.create_block("a").unwrap();
        func.append(a, IrType::Void, ValueKind::Jump { target: a }).unwrap();
        assert!(!is_mergeable(&func, a, a));
        assert!(try_merge_blocks(&func, a, a).is_none());
    }
}
