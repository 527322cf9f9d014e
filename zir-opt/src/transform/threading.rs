//! Jump threading
//!
//! A block holding nothing but an unconditional jump is a trampoline:
//! predecessors ending in a jump to it can jump straight to its target.

use log::{debug, trace};
use zir_common::BlockId;
use zir_ir::{Function, IrType, ValueKind};
use super::reachability::can_reach;

/// Target of a trampoline block
fn trampoline_target(function: &Function, block: BlockId) -> Option<BlockId> {
    match function.block(block)?.instructions() {
        [only] => match only.kind() {
            ValueKind::Jump { target } => Some(*target),
            _ => None,
        },
        _ => None,
    }
}

/// Exactly one instruction, and it is a Jump
pub fn is_threadable(function: &Function, block: BlockId) -> bool {
    trampoline_target(function, block).is_some()
}

/// Following trampolines from `block` leads back to it
fn in_trampoline_cycle(function: &Function, block: BlockId) -> bool {
    let mut current = block;
    for _ in 0..function.num_blocks() {
        match trampoline_target(function, current) {
            Some(next) if next == block => return true,
            Some(next) => current = next,
            None => return false,
        }
    }
    false
}

/// Whether predecessor `p` of trampoline `t` may jump straight to `d`
pub fn is_thread_safe(function: &Function, p: BlockId, t: BlockId, d: BlockId) -> bool {
    if p == t || t == d || !function.has_successor(p, t) {
        return false;
    }
    let Some(target) = trampoline_target(function, t) else {
        return false;
    };
    let p_jumps = function
        .block(p)
        .and_then(|block| block.terminator())
        .is_some_and(|term| matches!(term.kind(), ValueKind::Jump { .. }));
    if !p_jumps {
        return false;
    }
    if !function.block(d).is_some_and(|block| !block.has_phi()) {
        return false;
    }
    if in_trampoline_cycle(function, t) {
        return false;
    }
    target == d || can_reach(function, target, d)
}

/// Make `p` jump past trampoline `t` to its target. A trampoline left
/// without predecessors is removed.
pub fn thread_jump(function: &mut Function, p: BlockId, t: BlockId) -> bool {
    let Some(d) = trampoline_target(function, t) else {
        return false;
    };
    if !is_thread_safe(function, p, t, d) {
        return false;
    }
    if function.replace_terminator(p, IrType::Void, ValueKind::Jump { target: d }).is_err() {
        return false;
    }
    trace!("threaded {p} -> {t} -> {d}");

    if function.predecessors_of(t).is_empty() && function.entry() != Some(t) {
        function.remove_block(t);
    }
    true
}

/// Thread until nothing changes, for at most one round per block
pub fn thread_jumps(function: &mut Function) -> usize {
    let rounds = function.num_blocks();
    thread_jumps_bounded(function, rounds)
}

/// Thread until nothing changes or `max_rounds` rounds ran.
/// Returns the number of jumps threaded.
pub fn thread_jumps_bounded(function: &mut Function, max_rounds: usize) -> usize {
    let mut threaded = 0;
    let mut rounds = 0;
    while rounds < max_rounds {
        rounds += 1;
        let mut changed = 0;
        let candidates: Vec<BlockId> = function.block_ids().to_vec();
        for t in candidates {
            if !is_threadable(function, t) {
                continue;
            }
            for p in function.predecessors_of(t) {
                if thread_jump(function, p, t) {
                    changed += 1;
                }
            }
        }
        if changed == 0 {
            break;
        }
        threaded += changed;
    }
    if threaded > 0 {
        debug!("threaded {threaded} jump(s) in '{}' over {rounds} round(s)", function.name());
    }
    threaded
}
