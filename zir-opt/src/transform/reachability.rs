//! Reachability and cycle detection

use log::debug;
use std::collections::{BTreeSet, HashSet, VecDeque};
use zir_common::BlockId;
use zir_ir::Function;

/// Depth-first walk from `start` reporting every edge that closes a cycle,
/// i.e. targets a block still on the recursion stack.
fn dfs_back_edges(function: &Function, start: BlockId, visited: &mut HashSet<BlockId>, found: &mut Vec<(BlockId, BlockId)>) {
    if !visited.insert(start) {
        return;
    }
    let mut on_stack = HashSet::from([start]);
    let mut stack = vec![(start, function.successors_of(start), 0usize)];

    while let Some((node, succs, next)) = stack.last_mut() {
        let node = *node;
        if let Some(&succ) = succs.get(*next) {
            *next += 1;
            if on_stack.contains(&succ) {
                found.push((node, succ));
            } else if visited.insert(succ) {
                on_stack.insert(succ);
                let succ_succs = function.successors_of(succ);
                stack.push((succ, succ_succs, 0));
            }
        } else {
            on_stack.remove(&node);
            stack.pop();
        }
    }
}

/// Whether any cycle exists, reachable from the entry or not
pub fn has_cycle(function: &Function) -> bool {
    let mut visited = HashSet::new();
    let mut found = Vec::new();
    for &block in function.block_ids() {
        dfs_back_edges(function, block, &mut visited, &mut found);
        if !found.is_empty() {
            return true;
        }
    }
    false
}

/// Edges closing a cycle in a depth-first walk from the entry
pub fn back_edges(function: &Function) -> Vec<(BlockId, BlockId)> {
    let mut found = Vec::new();
    if let Some(entry) = function.entry() {
        dfs_back_edges(function, entry, &mut HashSet::new(), &mut found);
    }
    found
}

/// Breadth-first set of blocks reachable from `start`, `start` included
pub fn get_reachable_blocks(function: &Function, start: BlockId) -> BTreeSet<BlockId> {
    let mut reached = BTreeSet::new();
    if !function.contains_block(start) {
        return reached;
    }
    let mut queue = VecDeque::from([start]);
    reached.insert(start);
    while let Some(block) = queue.pop_front() {
        for succ in function.successors_of(block) {
            if reached.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    reached
}

pub fn can_reach(function: &Function, from: BlockId, to: BlockId) -> bool {
    get_reachable_blocks(function, from).contains(&to)
}

/// Blocks not reachable from the entry, in layout order
pub fn unreachable_blocks(function: &Function) -> Vec<BlockId> {
    let Some(entry) = function.entry() else {
        return Vec::new();
    };
    let reached = get_reachable_blocks(function, entry);
    function
        .block_ids()
        .iter()
        .copied()
        .filter(|b| !reached.contains(b))
        .collect()
}

/// Drop every block unreachable from the entry, along with the phi
/// incoming pairs that named it. Returns the number of blocks removed.
pub fn remove_unreachable_blocks(function: &mut Function) -> usize {
    let dead = unreachable_blocks(function);
    for &block in &dead {
        for succ in function.successors_of(block) {
            function.remove_phi_incoming(succ, block);
        }
    }
    for &block in &dead {
        function.remove_block(block);
    }
    if !dead.is_empty() {
        debug!("removed {} unreachable block(s) from '{}'", dead.len(), function.name());
    }
    dead.len()
}
