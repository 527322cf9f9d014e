//! CFG transformations

mod common;

use common::{if_else, init_logging, trampoline_chain, while_loop};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use zir_ir::{validate_function, BinaryOp, BlockId, Function, IrBuilder, IrType, PhiIncoming, ValueId, ValueKind};
use zir_opt::transform::*;
use zir_opt::DominanceInfo;

fn assert_valid(func: &Function) {
    let report = validate_function(func);
    assert!(report.is_valid(), "{report}\n{func}");
}

// ===== Edge tracker =====

#[test]
fn test_edge_symmetry() {
    let mut func = Function::new("edges", IrType::Void);
    let a = func.create_block("a").unwrap();
    let b = func.create_block("b").unwrap();

    func.add_successor(a, b);
    assert!(func.has_successor(a, b));
    assert!(func.has_predecessor(b, a));

    assert!(func.remove_successor(a, b));
    assert!(!func.has_successor(a, b));
    assert!(!func.has_predecessor(b, a));
}

// ===== Reachability =====

#[test]
fn test_cycle_detection() {
    let l = while_loop();
    assert!(has_cycle(&l.func));
    assert_eq!(back_edges(&l.func), vec![(l.body, l.header)]);

    let f = if_else();
    assert!(!has_cycle(&f.func));
    assert!(back_edges(&f.func).is_empty());
}

#[test]
fn test_reachable_blocks() {
    let f = if_else();
    assert_eq!(
        get_reachable_blocks(&f.func, f.then_bb),
        BTreeSet::from([f.then_bb, f.merge])
    );
    assert!(can_reach(&f.func, f.entry, f.merge));
    assert!(!can_reach(&f.func, f.merge, f.entry));
    assert!(unreachable_blocks(&f.func).is_empty());
}

#[test]
fn test_remove_unreachable_drops_phi_operands() {
    init_logging();
    let mut builder = IrBuilder::new();
    builder.create_function("dead", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    let dead = builder.create_block("dead").unwrap();
    let join = builder.create_block("join").unwrap();

    builder.position_at_end(entry).unwrap();
    let live = builder.build_int(1, IrType::I32).unwrap();
    builder.build_jump(join).unwrap();

    builder.position_at_end(dead).unwrap();
    let gone = builder.build_int(2, IrType::I32).unwrap();
    builder.build_jump(join).unwrap();

    builder.position_at_end(join).unwrap();
    let phi = builder.build_phi(join, IrType::I32, &[entry, dead], &[live, gone]).unwrap();
    builder.build_return(Some(phi)).unwrap();
    let mut func = builder.finish_function().unwrap();

    assert_eq!(unreachable_blocks(&func), vec![dead]);
    assert_eq!(remove_unreachable_blocks(&mut func), 1);
    assert!(!func.contains_block(dead));
    assert_eq!(func.predecessors_of(join), vec![entry]);
    assert_eq!(
        func.value(phi).unwrap().kind(),
        &ValueKind::Phi { incoming: vec![PhiIncoming { block: entry, value: live }] }
    );
    assert_valid(&func);

    assert_eq!(remove_unreachable_blocks(&mut func), 0);
}

// ===== Block merging =====

/// `a: x = 1 + 2; jump b`, `b: y = x * x; return y`
fn mergeable_pair() -> (Function, BlockId, BlockId) {
    let mut builder = IrBuilder::new();
    builder.create_function("pair", IrType::I32);
    let a = builder.create_block("a").unwrap();
    let b = builder.create_block("b").unwrap();

    builder.position_at_end(a).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    let two = builder.build_int(2, IrType::I32).unwrap();
    let x = builder.build_binary(BinaryOp::Add, one, two).unwrap();
    builder.build_jump(b).unwrap();

    builder.position_at_end(b).unwrap();
    let y = builder.build_binary(BinaryOp::Mul, x, x).unwrap();
    builder.build_return(Some(y)).unwrap();
    (builder.finish_function().unwrap(), a, b)
}

#[test]
fn test_merge_refused_with_two_predecessors() {
    let f = if_else();
    assert!(!is_mergeable(&f.func, f.then_bb, f.merge));
    assert!(try_merge_blocks(&f.func, f.then_bb, f.merge).is_none());

    let mut func = f.func.clone();
    assert!(!merge_blocks(&mut func, f.then_bb, f.merge));
    assert_eq!(func, f.func);
}

#[test]
fn test_merge_single_predecessor() {
    let (mut func, a, b) = mergeable_pair();
    let a_len = func.block(a).unwrap().len();
    let b_len = func.block(b).unwrap().len();

    assert!(is_mergeable(&func, a, b));
    assert!(is_safe_to_merge(&func, a, b));
    let merged = try_merge_blocks(&func, a, b).unwrap();
    assert_eq!(merged.len(), a_len - 1 + b_len);
    assert_eq!(merged.id(), a);
    assert_eq!(merged.label(), "a");

    // Pure: the function is untouched until the merge is applied
    assert_eq!(func.num_blocks(), 2);
    assert!(apply_merge(&mut func, a, b, merged));
    assert_eq!(func.block_ids(), &[a]);
    assert!(!func.contains_block(b));
    assert_eq!(func.entry(), Some(a));
    assert_valid(&func);
}

#[test]
fn test_merge_refused_when_variable_restored() {
    let mut builder = IrBuilder::new();
    builder.create_function("shadow", IrType::Void);
    let a = builder.create_block("a").unwrap();
    let b = builder.create_block("b").unwrap();

    builder.position_at_end(a).unwrap();
    let x = builder.build_local("x", IrType::I32).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    builder.build_store(x, one).unwrap();
    builder.build_jump(b).unwrap();

    builder.position_at_end(b).unwrap();
    let two = builder.build_int(2, IrType::I32).unwrap();
    builder.build_store(x, two).unwrap();
    builder.build_return(None).unwrap();
    let func = builder.finish_function().unwrap();

    assert!(is_mergeable(&func, a, b));
    assert!(!is_safe_to_merge(&func, a, b));
    assert!(try_merge_blocks(&func, a, b).is_none());
}

#[test]
fn test_merge_refused_with_phi() {
    let mut builder = IrBuilder::new();
    builder.create_function("phi", IrType::I32);
    let a = builder.create_block("a").unwrap();
    let b = builder.create_block("b").unwrap();
    builder.position_at_end(a).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    builder.build_jump(b).unwrap();
    builder.position_at_end(b).unwrap();
    let phi = builder.build_phi(b, IrType::I32, &[a], &[one]).unwrap();
    builder.build_return(Some(phi)).unwrap();
    let func = builder.finish_function().unwrap();

    assert!(is_mergeable(&func, a, b));
    assert!(!is_safe_to_merge(&func, a, b));
}

#[test]
fn test_merge_retargets_successor_phis() {
    let mut builder = IrBuilder::new();
    builder.create_function("retarget", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    let mid = builder.create_block("mid").unwrap();
    let tail = builder.create_block("tail").unwrap();
    let other = builder.create_block("other").unwrap();
    let join = builder.create_block("join").unwrap();

    builder.position_at_end(entry).unwrap();
    let cond = builder.build_bool(true).unwrap();
    builder.build_branch(cond, mid, other).unwrap();
    builder.position_at_end(mid).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    builder.build_jump(tail).unwrap();
    builder.position_at_end(tail).unwrap();
    builder.build_jump(join).unwrap();
    builder.position_at_end(other).unwrap();
    let two = builder.build_int(2, IrType::I32).unwrap();
    builder.build_jump(join).unwrap();
    builder.position_at_end(join).unwrap();
    let phi = builder.build_phi(join, IrType::I32, &[tail, other], &[one, two]).unwrap();
    builder.build_return(Some(phi)).unwrap();
    let mut func = builder.finish_function().unwrap();

    assert!(merge_blocks(&mut func, mid, tail));
    assert_eq!(func.predecessors_of(join), vec![mid, other]);
    assert_eq!(
        func.value(phi).unwrap().kind(),
        &ValueKind::Phi {
            incoming: vec![
                PhiIncoming { block: mid, value: one },
                PhiIncoming { block: other, value: two },
            ]
        }
    );
    assert_valid(&func);
}

#[test]
fn test_merge_all_blocks_collapses_chain() {
    init_logging();
    let mut builder = IrBuilder::new();
    builder.create_function("chain", IrType::I32);
    let blocks: Vec<BlockId> = (0..4)
        .map(|i| builder.create_block(format!("b{i}")).unwrap())
        .collect();
    let mut acc = None;
    for (i, &block) in blocks.iter().enumerate() {
        builder.position_at_end(block).unwrap();
        let k = builder.build_int(i as i64, IrType::I32).unwrap();
        let next = match acc {
            Some(prev) => builder.build_binary(BinaryOp::Add, prev, k).unwrap(),
            None => k,
        };
        acc = Some(next);
        match blocks.get(i + 1) {
            Some(&succ) => builder.build_jump(succ).unwrap(),
            None => builder.build_return(acc).unwrap(),
        };
    }
    let mut func = builder.finish_function().unwrap();

    assert_eq!(merge_all_blocks(&mut func), 3);
    assert_eq!(func.block_ids(), &[blocks[0]]);
    assert_eq!(func.block(blocks[0]).unwrap().len(), 4 + 3 + 1);
    assert_valid(&func);
}

// ===== Jump threading =====

#[test]
fn test_threading_converges_on_chain() {
    init_logging();
    let n = 5;
    let mut chain = trampoline_chain(n);
    for &t in &chain.trampolines {
        assert!(is_threadable(&chain.func, t));
    }

    let threaded = thread_jumps_bounded(&mut chain.func, n);
    assert!(threaded >= 1 && threaded <= n);
    assert_eq!(chain.func.successors_of(chain.entry), vec![chain.target]);
    assert_eq!(chain.func.predecessors_of(chain.target), vec![chain.entry]);
    assert_eq!(chain.func.num_blocks(), 2);
    assert_valid(&chain.func);

    // Nothing left to do
    assert_eq!(thread_jumps(&mut chain.func), 0);
}

#[test]
fn test_threading_declines_into_phi_block() {
    let mut builder = IrBuilder::new();
    builder.create_function("phi", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    let hop = builder.create_block("hop").unwrap();
    let dest = builder.create_block("dest").unwrap();
    builder.position_at_end(entry).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    builder.build_jump(hop).unwrap();
    builder.position_at_end(hop).unwrap();
    builder.build_jump(dest).unwrap();
    builder.position_at_end(dest).unwrap();
    let phi = builder.build_phi(dest, IrType::I32, &[hop], &[one]).unwrap();
    builder.build_return(Some(phi)).unwrap();
    let mut func = builder.finish_function().unwrap();

    assert!(is_threadable(&func, hop));
    assert!(!is_thread_safe(&func, entry, hop, dest));
    assert!(!thread_jump(&mut func, entry, hop));
    assert_eq!(func.successors_of(entry), vec![hop]);
}

#[test]
fn test_threading_declines_conditional_predecessor() {
    let mut builder = IrBuilder::new();
    builder.create_function("cond", IrType::Void);
    let entry = builder.create_block("entry").unwrap();
    let hop = builder.create_block("hop").unwrap();
    let done = builder.create_block("done").unwrap();
    builder.position_at_end(entry).unwrap();
    let cond = builder.build_bool(true).unwrap();
    builder.build_branch(cond, hop, done).unwrap();
    builder.position_at_end(hop).unwrap();
    builder.build_jump(done).unwrap();
    builder.position_at_end(done).unwrap();
    builder.build_return(None).unwrap();
    let mut func = builder.finish_function().unwrap();

    assert!(!is_thread_safe(&func, entry, hop, done));
    assert_eq!(thread_jumps(&mut func), 0);
}

#[test]
fn test_threading_keeps_shared_trampoline() {
    let mut builder = IrBuilder::new();
    builder.create_function("shared", IrType::Void);
    let entry = builder.create_block("entry").unwrap();
    let left = builder.create_block("left").unwrap();
    let right = builder.create_block("right").unwrap();
    let hop = builder.create_block("hop").unwrap();
    let done = builder.create_block("done").unwrap();
    builder.position_at_end(entry).unwrap();
    let cond = builder.build_bool(true).unwrap();
    builder.build_branch(cond, left, right).unwrap();
    builder.position_at_end(left).unwrap();
    builder.build_int(1, IrType::I32).unwrap();
    builder.build_jump(hop).unwrap();
    builder.position_at_end(right).unwrap();
    builder.build_int(2, IrType::I32).unwrap();
    builder.build_jump(hop).unwrap();
    builder.position_at_end(hop).unwrap();
    builder.build_jump(done).unwrap();
    builder.position_at_end(done).unwrap();
    builder.build_return(None).unwrap();
    let mut func = builder.finish_function().unwrap();

    assert!(thread_jump(&mut func, left, hop));
    // `right` still jumps through `hop`
    assert!(func.contains_block(hop));
    assert_eq!(func.successors_of(left), vec![done]);
    assert!(func.has_successor(hop, done));

    assert!(thread_jump(&mut func, right, hop));
    assert!(!func.contains_block(hop));
    assert_valid(&func);
}

// ===== Critical edges =====

/// `entry -> {mid, join}`, `mid -> join`, with a phi in `join`
fn critical_shape() -> (Function, [BlockId; 3], ValueId) {
    let mut builder = IrBuilder::new();
    builder.create_function("crit", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    let mid = builder.create_block("mid").unwrap();
    let join = builder.create_block("join").unwrap();

    builder.position_at_end(entry).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    let cond = builder.build_bool(true).unwrap();
    builder.build_branch(cond, mid, join).unwrap();
    builder.position_at_end(mid).unwrap();
    let two = builder.build_int(2, IrType::I32).unwrap();
    builder.build_jump(join).unwrap();
    builder.position_at_end(join).unwrap();
    let phi = builder.build_phi(join, IrType::I32, &[entry, mid], &[one, two]).unwrap();
    builder.build_return(Some(phi)).unwrap();
    (builder.finish_function().unwrap(), [entry, mid, join], phi)
}

#[test]
fn test_critical_edge_detection() {
    let (func, [entry, mid, join], _) = critical_shape();
    assert!(is_critical_edge(&func, entry, join));
    assert!(!is_critical_edge(&func, entry, mid));
    assert!(!is_critical_edge(&func, mid, join));
    assert_eq!(find_critical_edges(&func, entry), vec![(entry, join)]);

    let f = if_else();
    for &block in f.func.block_ids() {
        assert!(find_critical_edges(&f.func, block).is_empty());
    }
}

#[test]
fn test_split_critical_edge() {
    init_logging();
    let (mut func, [entry, mid, join], phi) = critical_shape();

    let split = split_critical_edge(&mut func, entry, join).unwrap();
    assert_eq!(func.label_of(split), Some("entry.join.split"));
    assert_eq!(func.successors_of(entry), vec![mid, split]);
    assert_eq!(func.successors_of(split), vec![join]);
    assert_eq!(func.predecessors_of(join), vec![mid, split]);

    let ValueKind::Phi { incoming } = func.value(phi).unwrap().kind() else {
        panic!("expected a phi");
    };
    assert!(incoming.iter().any(|inc| inc.block == split));
    assert!(!incoming.iter().any(|inc| inc.block == entry));
    assert_valid(&func);
}

#[test]
fn test_split_all_is_idempotent() {
    let (mut func, [entry, ..], _) = critical_shape();
    assert!(split_all_critical_edges(&mut func, entry));
    let edges = func.edge_count();
    assert!(!split_all_critical_edges(&mut func, entry));
    assert_eq!(func.edge_count(), edges);
    assert_eq!(split_function_critical_edges(&mut func), 0);
}

// ===== Value numbering =====

#[test]
fn test_local_value_numbering_finds_repeats() {
    let mut builder = IrBuilder::new();
    builder.create_function("lvn", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    builder.position_at_end(entry).unwrap();
    let a = builder.build_int(3, IrType::I32).unwrap();
    let b = builder.build_int(4, IrType::I32).unwrap();
    let sum = builder.build_binary(BinaryOp::Add, a, b).unwrap();
    let again = builder.build_binary(BinaryOp::Add, a, b).unwrap();
    let swapped = builder.build_binary(BinaryOp::Add, b, a).unwrap();
    let product = builder.build_binary(BinaryOp::Mul, sum, again).unwrap();
    let total = builder.build_binary(BinaryOp::Add, product, swapped).unwrap();
    builder.build_return(Some(total)).unwrap();
    let mut func = builder.finish_function().unwrap();

    let found = local_value_numbering(func.block(entry).unwrap());
    assert_eq!(found, vec![Redundancy { value: again, original: sum }]);

    assert_eq!(eliminate_local_redundancies(&mut func), 1);
    assert!(!func.contains_value(again));
    assert_eq!(
        func.value(product).unwrap().kind(),
        &ValueKind::Binary { op: BinaryOp::Mul, lhs: sum, rhs: sum }
    );
    assert_valid(&func);
}

#[test]
fn test_equal_operands_by_number_not_id() {
    let mut builder = IrBuilder::new();
    builder.create_function("numbers", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    builder.position_at_end(entry).unwrap();
    let a = builder.build_int(5, IrType::I32).unwrap();
    let a2 = builder.build_int(5, IrType::I32).unwrap();
    let neg = builder.build_unary(zir_ir::UnaryOp::Neg, a).unwrap();
    let neg2 = builder.build_unary(zir_ir::UnaryOp::Neg, a2).unwrap();
    builder.build_return(Some(neg2)).unwrap();
    let func = builder.finish_function().unwrap();

    let found = local_value_numbering(func.block(entry).unwrap());
    assert_eq!(
        found,
        vec![
            Redundancy { value: a2, original: a },
            Redundancy { value: neg2, original: neg },
        ]
    );
}

/// `entry: k = 7 -> {then, else} -> merge`, each arm and the merge
/// recomputing `k + k`
fn gvn_shape() -> (Function, [ValueId; 4]) {
    let mut builder = IrBuilder::new();
    builder.create_function("gvn", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    let then_bb = builder.create_block("then").unwrap();
    let else_bb = builder.create_block("else").unwrap();
    let merge = builder.create_block("merge").unwrap();

    builder.position_at_end(entry).unwrap();
    let k = builder.build_int(7, IrType::I32).unwrap();
    let in_entry = builder.build_binary(BinaryOp::Add, k, k).unwrap();
    let cond = builder.build_bool(true).unwrap();
    builder.build_branch(cond, then_bb, else_bb).unwrap();

    builder.position_at_end(then_bb).unwrap();
    let in_then = builder.build_binary(BinaryOp::Add, k, k).unwrap();
    builder.build_jump(merge).unwrap();

    builder.position_at_end(else_bb).unwrap();
    builder.build_jump(merge).unwrap();

    builder.position_at_end(merge).unwrap();
    let in_merge = builder.build_binary(BinaryOp::Add, k, k).unwrap();
    builder.build_return(Some(in_merge)).unwrap();
    (builder.finish_function().unwrap(), [k, in_entry, in_then, in_merge])
}

#[test]
fn test_global_value_numbering_reports_across_blocks() {
    let (func, [_, in_entry, in_then, in_merge]) = gvn_shape();
    let found: BTreeSet<Redundancy> = global_value_numbering(&func).into_iter().collect();
    assert_eq!(
        found,
        BTreeSet::from([
            Redundancy { value: in_then, original: in_entry },
            Redundancy { value: in_merge, original: in_entry },
        ])
    );
    // Reporting leaves the function alone
    assert!(func.contains_value(in_then));
}

#[test]
fn test_dominated_redundancies_are_removed() {
    let (mut func, [k, in_entry, in_then, in_merge]) = gvn_shape();
    let dom = DominanceInfo::compute(&func).unwrap().into_inner();

    assert_eq!(eliminate_dominated_redundancies(&mut func, &dom), 2);
    assert!(func.contains_value(k));
    assert!(func.contains_value(in_entry));
    assert!(!func.contains_value(in_then));
    assert!(!func.contains_value(in_merge));
    assert_valid(&func);
}
