//! Critical edge splitting
//!
//! An edge A -> B is critical when A has several successors and B has
//! several predecessors. Splitting routes it through a new block holding a
//! single jump, so code can be placed on that edge alone.

use log::{debug, trace};
use zir_common::BlockId;
use zir_ir::{Function, IrType, ValueKind};

pub fn is_critical_edge(function: &Function, a: BlockId, b: BlockId) -> bool {
    let (Some(block_a), Some(block_b)) = (function.block(a), function.block(b)) else {
        return false;
    };
    block_a.successors().contains(&b) && block_a.successors().len() > 1 && block_b.predecessors().len() > 1
}

/// Critical edges leaving `block`
pub fn find_critical_edges(function: &Function, block: BlockId) -> Vec<(BlockId, BlockId)> {
    function
        .successors_of(block)
        .into_iter()
        .filter(|succ| is_critical_edge(function, block, *succ))
        .map(|succ| (block, succ))
        .collect()
}

fn split_label(function: &Function, a: BlockId, b: BlockId) -> String {
    let base = format!(
        "{}.{}.split",
        function.label_of(a).unwrap_or_default(),
        function.label_of(b).unwrap_or_default()
    );
    let mut label = base.clone();
    let mut n = 0;
    while function.block_by_label(&label).is_some() {
        n += 1;
        label = format!("{base}.{n}");
    }
    label
}

/// Route the critical edge A -> B through a new block. Phis in B that named
/// A now name the new block. Returns the new block.
pub fn split_critical_edge(function: &mut Function, a: BlockId, b: BlockId) -> Option<BlockId> {
    if !is_critical_edge(function, a, b) {
        return None;
    }
    let terminator = function.block(a)?.terminator()?;
    let ty = terminator.ty().clone();
    let old_kind = terminator.kind().clone();

    let label = split_label(function, a, b);
    let split = function.create_block(label).ok()?;
    let rewired = function
        .append(split, IrType::Void, ValueKind::Jump { target: b })
        .and_then(|_| {
            let kind = old_kind.map_blocks(|target| if target == b { split } else { target });
            function.replace_terminator(a, ty, kind)
        });
    if rewired.is_err() {
        function.remove_block(split);
        return None;
    }

    function.retarget_phi_incoming(b, a, split);
    trace!("split {a} -> {b} with {split}");
    Some(split)
}

/// Split every critical edge leaving `block`. Returns whether any was split.
pub fn split_all_critical_edges(function: &mut Function, block: BlockId) -> bool {
    let mut split_any = false;
    for (a, b) in find_critical_edges(function, block) {
        split_any |= split_critical_edge(function, a, b).is_some();
    }
    split_any
}

/// Split every critical edge of the function. Returns the number split.
pub fn split_function_critical_edges(function: &mut Function) -> usize {
    let mut count = 0;
    for block in function.block_ids().to_vec() {
        for (a, b) in find_critical_edges(function, block) {
            if split_critical_edge(function, a, b).is_some() {
                count += 1;
            }
        }
    }
    if count > 0 {
        debug!("split {count} critical edge(s) in '{}'", function.name());
    }
    count
}
