//! Dominance analysis
//!
//! Iterative reaching-dominators fixpoint over the blocks reachable from
//! the entry:
//!
//! ```text
//! Dom(entry) = {entry}
//! Dom(B)     = {B} ∪ ⋂ Dom(P)   for every predecessor P of B
//! ```
//!
//! Every non-entry set starts as the full node set and only shrinks, so the
//! fixpoint is unique and independent of visiting order. The loop is capped;
//! hitting the cap yields `FixpointResult::Partial` with the snapshot
//! reached so far.
//!
//! Post-dominance is the same computation on the reversed CFG, rooted at a
//! virtual exit joined to every block without successors.

use log::{debug, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use zir_common::{BlockId, FixpointResult, ZirError};
use zir_ir::Function;

/// Round cap for the dominator fixpoint
pub const DEFAULT_ROUND_CAP: usize = 1000;

/// Dominator sets, immediate dominators and frontiers over an abstract graph
#[derive(Debug, Clone)]
struct DomTree<N> {
    root: N,
    dominators: HashMap<N, BTreeSet<N>>,
    idom: HashMap<N, N>,
    frontiers: HashMap<N, BTreeSet<N>>,
    rounds: usize,
    empty: BTreeSet<N>,
}

impl<N: Copy + Ord + Hash> DomTree<N> {
    /// `nodes` must all be reachable from `root`; `preds`/`succs` may name
    /// nodes outside that set, which are ignored.
    fn compute(
        root: N,
        nodes: &[N],
        preds: &HashMap<N, Vec<N>>,
        succs: &HashMap<N, Vec<N>>,
        cap: usize,
    ) -> FixpointResult<Self> {
        let members: HashSet<N> = nodes.iter().copied().collect();
        let all: BTreeSet<N> = nodes.iter().copied().collect();

        let mut dominators: HashMap<N, BTreeSet<N>> = nodes
            .iter()
            .map(|&n| {
                let initial = if n == root { BTreeSet::from([root]) } else { all.clone() };
                (n, initial)
            })
            .collect();

        let mut rounds = 0;
        let mut converged = false;
        while rounds < cap {
            rounds += 1;
            let mut changed = false;

            for &node in nodes {
                if node == root {
                    continue;
                }
                let mut incoming = preds
                    .get(&node)
                    .into_iter()
                    .flatten()
                    .filter(|p| members.contains(*p));
                let Some(first) = incoming.next() else {
                    continue;
                };

                let mut new_set = dominators[first].clone();
                for pred in incoming {
                    let pred_set = &dominators[pred];
                    new_set.retain(|d| pred_set.contains(d));
                }
                new_set.insert(node);

                if new_set != dominators[&node] {
                    dominators.insert(node, new_set);
                    changed = true;
                }
            }

            if !changed {
                converged = true;
                break;
            }
        }

        let mut tree = DomTree {
            root,
            dominators,
            idom: HashMap::new(),
            frontiers: HashMap::new(),
            rounds,
            empty: BTreeSet::new(),
        };
        tree.compute_idoms(nodes);
        tree.compute_frontiers(nodes, &members, preds, succs);

        if converged {
            FixpointResult::Converged(tree)
        } else {
            FixpointResult::Partial(tree)
        }
    }

    /// The immediate dominator of B is the strict dominator that every
    /// other strict dominator of B dominates.
    fn compute_idoms(&mut self, nodes: &[N]) {
        for &node in nodes {
            if node == self.root {
                continue;
            }
            let Some(doms) = self.dominators.get(&node) else {
                continue;
            };
            let closest = doms.iter().copied().filter(|d| *d != node).find(|candidate| {
                let candidate_doms = &self.dominators[candidate];
                doms.iter().all(|other| *other == node || candidate_doms.contains(other))
            });
            if let Some(idom) = closest {
                self.idom.insert(node, idom);
            }
        }
    }

    fn compute_frontiers(
        &mut self,
        nodes: &[N],
        members: &HashSet<N>,
        preds: &HashMap<N, Vec<N>>,
        succs: &HashMap<N, Vec<N>>,
    ) {
        let mut frontiers: HashMap<N, BTreeSet<N>> = HashMap::new();

        // Local rule: successors this node does not strictly dominate
        for &node in nodes {
            for &succ in succs.get(&node).into_iter().flatten() {
                if members.contains(&succ) && !self.strictly_dominates(node, succ) {
                    frontiers.entry(node).or_default().insert(succ);
                }
            }
        }

        // Join nodes: walk up from each predecessor until the join's idom
        for &join in nodes {
            let join_preds: Vec<N> = preds
                .get(&join)
                .into_iter()
                .flatten()
                .copied()
                .filter(|p| members.contains(p))
                .collect();
            if join_preds.len() < 2 {
                continue;
            }
            let stop = self.idom.get(&join).copied();
            for pred in join_preds {
                let mut runner = Some(pred);
                let mut steps = 0;
                while let Some(current) = runner {
                    if Some(current) == stop || steps > nodes.len() {
                        break;
                    }
                    frontiers.entry(current).or_default().insert(join);
                    runner = self.idom.get(&current).copied();
                    steps += 1;
                }
            }
        }

        self.frontiers = frontiers;
    }

    fn contains(&self, node: N) -> bool {
        self.dominators.contains_key(&node)
    }

    fn dominates(&self, d: N, b: N) -> bool {
        d == b || self.dominators.get(&b).is_some_and(|set| set.contains(&d))
    }

    fn strictly_dominates(&self, d: N, b: N) -> bool {
        d != b && self.dominates(d, b)
    }

    fn dominators(&self, node: N) -> &BTreeSet<N> {
        self.dominators.get(&node).unwrap_or(&self.empty)
    }

    fn frontier(&self, node: N) -> &BTreeSet<N> {
        self.frontiers.get(&node).unwrap_or(&self.empty)
    }
}

/// Blocks reachable from the entry in reverse postorder
pub fn reverse_postorder(function: &Function) -> Vec<BlockId> {
    let Some(entry) = function.entry() else {
        return Vec::new();
    };

    let mut visited = HashSet::from([entry]);
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, function.successors_of(entry), 0usize)];

    while let Some((node, succs, next)) = stack.last_mut() {
        if let Some(&succ) = succs.get(*next) {
            *next += 1;
            if visited.insert(succ) {
                let succ_succs = function.successors_of(succ);
                stack.push((succ, succ_succs, 0));
            }
        } else {
            postorder.push(*node);
            stack.pop();
        }
    }

    postorder.reverse();
    postorder
}

/// Dominance snapshot of one function
#[derive(Debug, Clone)]
pub struct DominanceInfo {
    tree: DomTree<BlockId>,
    order: Vec<BlockId>,
}

impl DominanceInfo {
    /// Compute with the default round cap
    pub fn compute(function: &Function) -> Result<FixpointResult<Self>, ZirError> {
        Self::compute_with_cap(function, DEFAULT_ROUND_CAP)
    }

    pub fn compute_with_cap(function: &Function, cap: usize) -> Result<FixpointResult<Self>, ZirError> {
        let entry = function
            .entry()
            .ok_or_else(|| ZirError::EmptyFunction(function.name().to_string()))?;

        let order = reverse_postorder(function);
        let mut preds = HashMap::new();
        let mut succs = HashMap::new();
        for &block in &order {
            preds.insert(block, function.predecessors_of(block));
            succs.insert(block, function.successors_of(block));
        }

        let result = DomTree::compute(entry, &order, &preds, &succs, cap);
        match &result {
            FixpointResult::Converged(tree) => {
                debug!("dominance for '{}' converged after {} round(s)", function.name(), tree.rounds)
            }
            FixpointResult::Partial(tree) => {
                warn!(
                    "dominance for '{}' did not converge within {} round(s); using partial result",
                    function.name(),
                    tree.rounds
                )
            }
        }
        Ok(result.map(|tree| DominanceInfo { tree, order }))
    }

    pub fn entry(&self) -> BlockId {
        self.tree.root
    }

    /// Rounds the fixpoint ran
    pub fn rounds(&self) -> usize {
        self.tree.rounds
    }

    /// Reachable blocks in reverse postorder
    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.order
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.tree.contains(block)
    }

    /// Every block dominates itself; otherwise `d` must be on every path
    /// from the entry to `b`. Unreachable blocks are dominated only by themselves.
    pub fn dominates(&self, d: BlockId, b: BlockId) -> bool {
        self.tree.dominates(d, b)
    }

    pub fn strictly_dominates(&self, d: BlockId, b: BlockId) -> bool {
        self.tree.strictly_dominates(d, b)
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.tree.idom.get(&block).copied()
    }

    pub fn dominators(&self, block: BlockId) -> &BTreeSet<BlockId> {
        self.tree.dominators(block)
    }

    pub fn frontier(&self, block: BlockId) -> &BTreeSet<BlockId> {
        self.tree.frontier(block)
    }

    /// Children in the dominator tree, in reverse postorder
    pub fn dominator_tree_children(&self, block: BlockId) -> Vec<BlockId> {
        self.order
            .iter()
            .copied()
            .filter(|b| self.immediate_dominator(*b) == Some(block))
            .collect()
    }

    /// Iterated dominance frontier of a set of blocks
    pub fn iterated_frontier(&self, blocks: impl IntoIterator<Item = BlockId>) -> BTreeSet<BlockId> {
        let mut result = BTreeSet::new();
        let mut worklist: Vec<BlockId> = blocks.into_iter().collect();
        let mut queued: HashSet<BlockId> = worklist.iter().copied().collect();

        while let Some(block) = worklist.pop() {
            for &df in self.frontier(block) {
                if result.insert(df) && queued.insert(df) {
                    worklist.push(df);
                }
            }
        }
        result
    }
}

/// Node of the reversed CFG used for post-dominance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum PostNode {
    Block(BlockId),
    Exit,
}

/// Post-dominance snapshot of one function.
///
/// Blocks that cannot reach an exit (for instance inside an infinite loop)
/// are post-dominated only by themselves.
#[derive(Debug, Clone)]
pub struct PostDominanceInfo {
    tree: DomTree<PostNode>,
}

impl PostDominanceInfo {
    pub fn compute(function: &Function) -> Result<FixpointResult<Self>, ZirError> {
        Self::compute_with_cap(function, DEFAULT_ROUND_CAP)
    }

    pub fn compute_with_cap(function: &Function, cap: usize) -> Result<FixpointResult<Self>, ZirError> {
        if function.num_blocks() == 0 {
            return Err(ZirError::EmptyFunction(function.name().to_string()));
        }

        // Reversed edges: a forward edge a -> b becomes b -> a, and every
        // exit block x gets the virtual edge Exit -> x.
        let mut rev_preds: HashMap<PostNode, Vec<PostNode>> = HashMap::new();
        let mut rev_succs: HashMap<PostNode, Vec<PostNode>> = HashMap::new();
        for block in function.blocks() {
            let node = PostNode::Block(block.id());
            let mut forward_succs: Vec<PostNode> =
                block.successors().iter().map(|s| PostNode::Block(*s)).collect();
            if block.successors().is_empty() {
                forward_succs.push(PostNode::Exit);
                rev_succs.entry(PostNode::Exit).or_default().push(node);
            }
            rev_preds.insert(node, forward_succs);
            rev_succs
                .entry(node)
                .or_default()
                .extend(block.predecessors().iter().map(|p| PostNode::Block(*p)));
        }

        // Nodes reachable from the virtual exit in the reversed graph
        let mut order = vec![PostNode::Exit];
        let mut seen = HashSet::from([PostNode::Exit]);
        let mut next = 0;
        while next < order.len() {
            let node = order[next];
            next += 1;
            for &succ in rev_succs.get(&node).into_iter().flatten() {
                if seen.insert(succ) {
                    order.push(succ);
                }
            }
        }

        let result = DomTree::compute(PostNode::Exit, &order, &rev_preds, &rev_succs, cap);
        if !result.is_converged() {
            warn!("post-dominance for '{}' did not converge within {cap} round(s)", function.name());
        }
        Ok(result.map(|tree| PostDominanceInfo { tree }))
    }

    /// Whether every path from `b` to an exit passes through `d`
    pub fn post_dominates(&self, d: BlockId, b: BlockId) -> bool {
        self.tree.dominates(PostNode::Block(d), PostNode::Block(b))
    }

    /// The closest strict post-dominator; `None` when it is the virtual exit
    pub fn immediate_post_dominator(&self, block: BlockId) -> Option<BlockId> {
        match self.tree.idom.get(&PostNode::Block(block)) {
            Some(PostNode::Block(ipdom)) => Some(*ipdom),
            _ => None,
        }
    }

    pub fn reaches_exit(&self, block: BlockId) -> bool {
        self.tree.contains(PostNode::Block(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zir_ir::{IrType, ValueKind};

    fn chain(len: usize) -> (Function, Vec<BlockId>) {
        let mut func = Function::new("chain", IrType::Void);
        let blocks: Vec<BlockId> = (0..len)
            .map(|i| func.create_block(format!("b{i}")).unwrap())
            .collect();
        for pair in blocks.windows(2) {
            func.append(pair[0], IrType::Void, ValueKind::Jump { target: pair[1] }).unwrap();
        }
        func.append(blocks[len - 1], IrType::Void, ValueKind::Return { value: None }).unwrap();
        (func, blocks)
    }

    #[test]
    fn test_chain_idoms() {
        let (func, blocks) = chain(4);
        let dom = DominanceInfo::compute(&func).unwrap().converged().unwrap();

        assert_eq!(dom.immediate_dominator(blocks[0]), None);
        for pair in blocks.windows(2) {
            assert_eq!(dom.immediate_dominator(pair[1]), Some(pair[0]));
        }
        assert_eq!(dom.dominators(blocks[3]).len(), 4);
        assert!(dom.frontier(blocks[1]).is_empty());
        assert_eq!(dom.dominator_tree_children(blocks[0]), vec![blocks[1]]);
    }

    #[test]
    fn test_round_cap_yields_partial() {
        let (func, blocks) = chain(3);
        let result = DominanceInfo::compute_with_cap(&func, 1).unwrap();
        assert!(!result.is_converged());

        // The snapshot is still usable
        let dom = result.into_inner();
        assert_eq!(dom.rounds(), 1);
        assert!(dom.dominates(blocks[0], blocks[2]));
    }

    #[test]
    fn test_empty_function_is_an_error() {
        let func = Function::new("empty", IrType::Void);
        assert_eq!(
            DominanceInfo::compute(&func).unwrap_err(),
            ZirError::EmptyFunction("empty".to_string())
        );
        assert!(PostDominanceInfo::compute(&func).is_err());
    }

    #[test]
    fn test_unreachable_block_only_dominates_itself() {
        let (mut func, blocks) = chain(2);
        let island = func.create_block("island").unwrap();
        func.append(island, IrType::Void, ValueKind::Jump { target: blocks[1] }).unwrap();

        let dom = DominanceInfo::compute(&func).unwrap().into_inner();
        assert!(!dom.is_reachable(island));
        assert!(dom.dominates(island, island));
        assert!(!dom.dominates(blocks[0], island));
        assert_eq!(dom.immediate_dominator(island), None);
        // The island is ignored when intersecting b1's predecessors
        assert_eq!(dom.immediate_dominator(blocks[1]), Some(blocks[0]));
    }

    #[test]
    fn test_reverse_postorder_starts_at_entry() {
        let (func, blocks) = chain(3);
        assert_eq!(reverse_postorder(&func), blocks);
    }

    #[test]
    fn test_post_dominance_on_chain() {
        let (func, blocks) = chain(3);
        let pdom = PostDominanceInfo::compute(&func).unwrap().into_inner();

        assert!(pdom.post_dominates(blocks[2], blocks[0]));
        assert!(!pdom.post_dominates(blocks[0], blocks[2]));
        assert_eq!(pdom.immediate_post_dominator(blocks[0]), Some(blocks[1]));
        assert_eq!(pdom.immediate_post_dominator(blocks[2]), None);
    }
}
