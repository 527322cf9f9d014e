//! SSA variable versioning
//!
//! The translator records every assignment of a source variable as a new
//! version in a `VariableTable` and asks it for the current definition when
//! the variable is read. At merge points the helpers here build the phis
//! that reconcile the versions reaching the merge along each arm.
//!
//! A variable is a named `Local` slot: it is defined by a `Store` through
//! the slot and read by a `Load` from it.

use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use zir_common::{BlockId, ValueId, ZirError};
use zir_ir::{Function, PhiIncoming, ValueKind};
use crate::dominance::DominanceInfo;

/// The current version index of every variable at some program point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSnapshot {
    versions: BTreeMap<String, usize>,
}

impl VersionSnapshot {
    pub fn version(&self, name: &str) -> Option<usize> {
        self.versions.get(name).copied()
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Version history of the variables of one function.
///
/// History is append-only; the current index of a variable may move back to
/// an earlier version when a snapshot is restored (translating the second
/// arm of an `if` starts from the state before the first).
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    definitions: BTreeMap<String, Vec<ValueId>>,
    current: BTreeMap<String, usize>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the current version; `None` if the variable is undefined here
    pub fn current_version(&self, name: &str) -> Option<usize> {
        self.current.get(name).copied()
    }

    /// Record a new definition. Indices start at 0 and only grow.
    pub fn create_new_version(&mut self, name: &str, def: ValueId) -> usize {
        let history = self.definitions.entry(name.to_string()).or_default();
        history.push(def);
        let index = history.len() - 1;
        self.current.insert(name.to_string(), index);
        trace!("{name}.{index} = {def}");
        index
    }

    pub fn get_version_definition(&self, name: &str, index: usize) -> Option<ValueId> {
        self.definitions.get(name)?.get(index).copied()
    }

    pub fn get_current_definition(&self, name: &str) -> Option<ValueId> {
        self.get_version_definition(name, self.current_version(name)?)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn version_count(&self, name: &str) -> usize {
        self.definitions.get(name).map_or(0, Vec::len)
    }

    /// Every variable with a recorded definition
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn snapshot(&self) -> VersionSnapshot {
        VersionSnapshot { versions: self.current.clone() }
    }

    /// Make the snapshot's versions current again. Variables first defined
    /// after the snapshot become undefined; their history is kept.
    pub fn restore(&mut self, snapshot: &VersionSnapshot) {
        self.current = snapshot.versions.clone();
    }

    /// Definition of `name` as of the snapshot
    pub fn definition_at(&self, snapshot: &VersionSnapshot, name: &str) -> Option<ValueId> {
        self.get_version_definition(name, snapshot.version(name)?)
    }

    fn set_current(&mut self, name: &str, index: usize) {
        self.current.insert(name.to_string(), index);
    }

    fn forget(&mut self, name: &str) {
        self.current.remove(name);
    }

    /// Make `to` current for every variable whose current definition is `from`
    fn substitute(&mut self, from: ValueId, to: ValueId) {
        let stale: Vec<String> = self
            .current
            .keys()
            .filter(|name| self.get_current_definition(name) == Some(from))
            .cloned()
            .collect();
        for name in stale {
            self.create_new_version(&name, to);
        }
    }
}

/// Variable name of a `Local` slot, if `ptr` is one
pub fn variable_of(function: &Function, ptr: ValueId) -> Option<&str> {
    match function.value(ptr)?.kind() {
        ValueKind::Local { name } => Some(name),
        _ => None,
    }
}

/// Blocks holding a `Store` to each variable
pub fn variable_definitions(function: &Function) -> BTreeMap<String, BTreeSet<BlockId>> {
    let mut defs: BTreeMap<String, BTreeSet<BlockId>> = BTreeMap::new();
    for block in function.blocks() {
        for instr in block.instructions() {
            if let ValueKind::Store { ptr, .. } = instr.kind() {
                if let Some(name) = variable_of(function, *ptr) {
                    defs.entry(name.to_string()).or_default().insert(block.id());
                }
            }
        }
    }
    defs
}

/// Blocks needing a phi for each variable: the iterated dominance frontier
/// of its definition blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhiPlacement {
    blocks: BTreeMap<String, BTreeSet<BlockId>>,
}

impl PhiPlacement {
    pub fn compute(dom: &DominanceInfo, defs: &BTreeMap<String, BTreeSet<BlockId>>) -> Self {
        let blocks = defs
            .iter()
            .map(|(name, def_blocks)| (name.clone(), dom.iterated_frontier(def_blocks.iter().copied())))
            .filter(|(_, idf)| !idf.is_empty())
            .collect();
        PhiPlacement { blocks }
    }

    pub fn blocks_for(&self, name: &str) -> Option<&BTreeSet<BlockId>> {
        self.blocks.get(name)
    }

    pub fn needs_phi(&self, name: &str, block: BlockId) -> bool {
        self.blocks.get(name).is_some_and(|set| set.contains(&block))
    }

    /// Variables needing a phi at `block`
    pub fn variables_at(&self, block: BlockId) -> Vec<&str> {
        self.blocks
            .iter()
            .filter(|(_, set)| set.contains(&block))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Reconcile the versions reaching `merge` along each arm.
///
/// Each arm pairs a predecessor of `merge` with the variable state at the end
/// of that predecessor. A variable defined on every arm gets a phi when the
/// definitions differ, and the phi becomes current; when all arms agree the
/// shared definition becomes current. Variables missing from some arm are
/// undefined after the merge.
///
/// Returns the phis built, by variable name. An arm whose block is not a
/// predecessor of `merge` fails with `UnknownBlock` before anything is built.
pub fn merge_versions(
    function: &mut Function,
    table: &mut VariableTable,
    merge: BlockId,
    arms: &[(BlockId, VersionSnapshot)],
) -> Result<Vec<(String, ValueId)>, ZirError> {
    if !function.contains_block(merge) {
        return Err(ZirError::UnknownBlock(merge));
    }
    if let Some((pred, _)) = arms.iter().find(|(pred, _)| !function.has_predecessor(merge, *pred)) {
        return Err(ZirError::UnknownBlock(*pred));
    }
    let Some((_, first)) = arms.first() else {
        return Ok(Vec::new());
    };

    let mut names: BTreeSet<String> = first.variables().map(str::to_string).collect();
    for (_, snapshot) in &arms[1..] {
        names.extend(snapshot.variables().map(str::to_string));
    }

    let mut phis = Vec::new();
    for name in names {
        let defs: Option<Vec<ValueId>> = arms
            .iter()
            .map(|(_, snapshot)| table.definition_at(snapshot, &name))
            .collect();
        let Some(defs) = defs else {
            trace!("'{name}' is not defined on every arm into {merge}");
            table.forget(&name);
            continue;
        };

        if defs.iter().all(|d| *d == defs[0]) {
            if let Some(index) = first.version(&name) {
                table.set_current(&name, index);
            }
            continue;
        }

        let ty = function
            .value(defs[0])
            .map(|v| v.ty().clone())
            .ok_or(ZirError::UnknownValue(defs[0]))?;
        let incoming = arms
            .iter()
            .zip(&defs)
            .map(|((block, _), value)| PhiIncoming { block: *block, value: *value })
            .collect();
        let phi = function.append(merge, ty, ValueKind::Phi { incoming })?;
        table.create_new_version(&name, phi);
        phis.push((name, phi));
    }

    debug!("merge at {merge}: {} phi(s) from {} arm(s)", phis.len(), arms.len());
    Ok(phis)
}

/// Header phis of a loop whose latch is not translated yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopPhis {
    header: BlockId,
    phis: Vec<(String, ValueId)>,
}

impl LoopPhis {
    pub fn header(&self) -> BlockId {
        self.header
    }

    pub fn phis(&self) -> &[(String, ValueId)] {
        &self.phis
    }

    pub fn phi_for(&self, name: &str) -> Option<ValueId> {
        self.phis.iter().find(|(n, _)| n == name).map(|(_, phi)| *phi)
    }
}

/// Before translating a loop body: give every currently defined variable a
/// phi in `header` carrying its definition from `preheader`. The phis become
/// the current versions inside the loop.
pub fn open_loop_phis(
    function: &mut Function,
    table: &mut VariableTable,
    header: BlockId,
    preheader: BlockId,
) -> Result<LoopPhis, ZirError> {
    let current: Vec<(String, ValueId)> = table
        .current
        .keys()
        .filter_map(|name| Some((name.clone(), table.get_current_definition(name)?)))
        .collect();

    let mut phis = Vec::with_capacity(current.len());
    for (name, def) in current {
        let ty = function
            .value(def)
            .map(|v| v.ty().clone())
            .ok_or(ZirError::UnknownValue(def))?;
        let incoming = vec![PhiIncoming { block: preheader, value: def }];
        let phi = function.append(header, ty, ValueKind::Phi { incoming })?;
        table.create_new_version(&name, phi);
        phis.push((name, phi));
    }
    Ok(LoopPhis { header, phis })
}

/// After translating the body: complete the header phis with the
/// definitions current at `latch`, then drop phis that turned out trivial
/// (every incoming value is the phi itself or one other value). Removing one
/// phi can make another trivial, so removal repeats until nothing changes.
///
/// The header values are current afterwards, since the loop exits from the
/// header. Returns the number of trivial phis removed.
pub fn seal_loop_phis(
    function: &mut Function,
    table: &mut VariableTable,
    loop_phis: LoopPhis,
    latch: BlockId,
) -> Result<usize, ZirError> {
    for (name, phi) in &loop_phis.phis {
        let from_latch = table.get_current_definition(name).unwrap_or(*phi);
        function.add_phi_incoming(*phi, latch, from_latch)?;
    }

    let mut live: Vec<ValueId> = loop_phis.phis.iter().map(|(_, phi)| *phi).collect();
    let mut forwarded: BTreeMap<ValueId, ValueId> = BTreeMap::new();
    loop {
        let found = live
            .iter()
            .enumerate()
            .find_map(|(i, phi)| Some((i, trivial_phi_value(function, *phi)?)));
        let Some((index, same)) = found else {
            break;
        };
        let phi = live.remove(index);
        function.remove_value(phi);
        function.replace_all_uses(phi, same);
        table.substitute(phi, same);
        forwarded.insert(phi, same);
    }

    for (name, phi) in &loop_phis.phis {
        let mut value = *phi;
        while let Some(next) = forwarded.get(&value) {
            value = *next;
        }
        table.create_new_version(name, value);
    }

    let removed = forwarded.len();
    if removed > 0 {
        debug!("removed {removed} trivial phi(s) from loop header {}", loop_phis.header);
    }
    Ok(removed)
}

/// The single value a phi forwards, ignoring self references
fn trivial_phi_value(function: &Function, phi: ValueId) -> Option<ValueId> {
    let ValueKind::Phi { incoming } = function.value(phi)?.kind() else {
        return None;
    };
    let mut others = incoming.iter().map(|inc| inc.value).filter(|v| *v != phi);
    let first = others.next()?;
    others.all(|v| v == first).then_some(first)
}
