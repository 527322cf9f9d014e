//! Structural validation
//!
//! Checks a module, function by function, and reports every violation it
//! finds with the block and value it concerns. A report with no violations
//! means the IR is well formed; the passes in `zir-opt` run this after each
//! transformation.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;
use zir_common::{BlockId, ValueId};
use crate::{BasicBlock, Function, IrType, Module, Value, ValueKind};

/// What is wrong
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    #[error("duplicate function name '{0}'")]
    DuplicateFunction(String),

    #[error("function has an empty name")]
    EmptyFunctionName,

    #[error("function has blocks but no entry block")]
    MissingEntry,

    #[error("entry block has predecessors")]
    EntryHasPredecessors,

    #[error("block has an empty label")]
    EmptyLabel,

    #[error("duplicate block label '{0}'")]
    DuplicateLabel(String),

    #[error("value id used more than once")]
    DuplicateValueId,

    #[error("terminator is not the last instruction")]
    TerminatorNotLast,

    #[error("phi follows a non-phi instruction")]
    PhiNotAtHead,

    #[error("operand {0} does not resolve in this function")]
    UnknownOperand(ValueId),

    #[error("block reference {0} does not resolve in this function")]
    UnknownBlockRef(BlockId),

    #[error("call has an empty callee name")]
    EmptyCallee,

    #[error("local has an empty name")]
    EmptyLocalName,

    #[error("successors {actual:?} do not match terminator targets {expected:?}")]
    SuccessorMismatch { expected: Vec<BlockId>, actual: Vec<BlockId> },

    #[error("edge {from} -> {to} is not mirrored on both blocks")]
    AsymmetricEdge { from: BlockId, to: BlockId },

    #[error("phi has no incoming values")]
    EmptyPhi,

    #[error("phi has {incoming} incoming values but the block has {predecessors} predecessors")]
    PhiArity { incoming: usize, predecessors: usize },

    #[error("phi incoming block {0} is not a predecessor")]
    PhiIncomingNotPredecessor(BlockId),

    #[error("phi names incoming block {0} more than once")]
    DuplicatePhiIncoming(BlockId),

    #[error("predecessor {0} has no phi incoming value")]
    PhiMissingPredecessor(BlockId),

    #[error("phi incoming {value} has type {found}, expected {expected}")]
    PhiTypeMismatch { value: ValueId, expected: IrType, found: IrType },

    #[error("comptime flag does not match operands")]
    ComptimeMismatch,
}

/// One violation and where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub function: String,
    pub block: Option<BlockId>,
    pub value: Option<ValueId>,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function)?;
        if let Some(block) = self.block {
            write!(f, ":{block}")?;
        }
        if let Some(value) = self.value {
            write!(f, ":{value}")?;
        }
        write!(f, ": {}", self.kind)
    }
}

/// All violations of one validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether any violation is of the given kind (ignoring payload)
    pub fn has(&self, pred: impl Fn(&ViolationKind) -> bool) -> bool {
        self.violations.iter().any(|v| pred(&v.kind))
    }

    fn extend(&mut self, other: ValidationReport) {
        self.violations.extend(other.violations);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "valid");
        }
        for violation in &self.violations {
            writeln!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Validate every function of a module and the module-level naming rule
pub fn validate_module(module: &Module) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = HashSet::new();
    for function in module.functions() {
        if !seen.insert(function.name()) {
            report.violations.push(Violation {
                function: function.name().to_string(),
                block: None,
                value: None,
                kind: ViolationKind::DuplicateFunction(function.name().to_string()),
            });
        }
        report.extend(validate_function(function));
    }
    report
}

/// Validate a single function
pub fn validate_function(function: &Function) -> ValidationReport {
    let mut checker = FunctionChecker {
        function,
        report: ValidationReport::default(),
    };
    checker.run();
    checker.report
}

struct FunctionChecker<'a> {
    function: &'a Function,
    report: ValidationReport,
}

impl<'a> FunctionChecker<'a> {
    fn emit(&mut self, block: Option<BlockId>, value: Option<ValueId>, kind: ViolationKind) {
        self.report.violations.push(Violation {
            function: self.function.name().to_string(),
            block,
            value,
            kind,
        });
    }

    fn run(&mut self) {
        let function = self.function;
        if function.name().is_empty() {
            self.emit(None, None, ViolationKind::EmptyFunctionName);
        }
        if function.num_blocks() == 0 {
            return;
        }
        match function.entry_block() {
            None => self.emit(None, None, ViolationKind::MissingEntry),
            Some(entry) if !entry.predecessors().is_empty() => {
                self.emit(Some(entry.id()), None, ViolationKind::EntryHasPredecessors)
            }
            Some(_) => {}
        }

        let mut labels = HashSet::new();
        let mut value_ids = HashSet::new();
        for block in function.blocks() {
            if block.label().is_empty() {
                self.emit(Some(block.id()), None, ViolationKind::EmptyLabel);
            } else if !labels.insert(block.label()) {
                self.emit(Some(block.id()), None, ViolationKind::DuplicateLabel(block.label().to_string()));
            }
            for instr in block.instructions() {
                if !value_ids.insert(instr.id()) {
                    self.emit(Some(block.id()), Some(instr.id()), ViolationKind::DuplicateValueId);
                }
            }
            self.check_layout(block);
            self.check_edges(block);
            for instr in block.instructions() {
                self.check_value(block, instr);
            }
        }
    }

    fn check_layout(&mut self, block: &BasicBlock) {
        let last = block.len().saturating_sub(1);
        let mut seen_non_phi = false;
        for (i, instr) in block.instructions().iter().enumerate() {
            if instr.is_terminator() && i != last {
                self.emit(Some(block.id()), Some(instr.id()), ViolationKind::TerminatorNotLast);
            }
            if instr.is_phi() {
                if seen_non_phi {
                    self.emit(Some(block.id()), Some(instr.id()), ViolationKind::PhiNotAtHead);
                }
            } else {
                seen_non_phi = true;
            }
        }
    }

    fn check_edges(&mut self, block: &BasicBlock) {
        let expected: BTreeSet<BlockId> = block
            .terminator()
            .map(|t| t.kind().block_targets().into_iter().collect())
            .unwrap_or_default();
        if &expected != block.successors() {
            self.emit(
                Some(block.id()),
                None,
                ViolationKind::SuccessorMismatch {
                    expected: expected.into_iter().collect(),
                    actual: block.successors().iter().copied().collect(),
                },
            );
        }

        for succ in block.successors() {
            if !self.function.has_predecessor(*succ, block.id()) {
                self.emit(Some(block.id()), None, ViolationKind::AsymmetricEdge { from: block.id(), to: *succ });
            }
        }
        for pred in block.predecessors() {
            if !self.function.has_successor(*pred, block.id()) {
                self.emit(Some(block.id()), None, ViolationKind::AsymmetricEdge { from: *pred, to: block.id() });
            }
        }
    }

    fn check_value(&mut self, block: &BasicBlock, value: &Value) {
        let function = self.function;
        let at = (Some(block.id()), Some(value.id()));

        for operand in value.kind().operands() {
            if !function.contains_value(operand) {
                self.emit(at.0, at.1, ViolationKind::UnknownOperand(operand));
            }
        }
        for target in value.kind().block_refs() {
            if !function.contains_block(target) {
                self.emit(at.0, at.1, ViolationKind::UnknownBlockRef(target));
            }
        }

        match value.kind() {
            ValueKind::Call { callee, .. } if callee.is_empty() => {
                self.emit(at.0, at.1, ViolationKind::EmptyCallee);
            }
            ValueKind::Local { name } if name.is_empty() => {
                self.emit(at.0, at.1, ViolationKind::EmptyLocalName);
            }
            ValueKind::Phi { incoming } => {
                if incoming.is_empty() {
                    self.emit(at.0, at.1, ViolationKind::EmptyPhi);
                }
                if incoming.len() != block.predecessors().len() {
                    self.emit(at.0, at.1, ViolationKind::PhiArity {
                        incoming: incoming.len(),
                        predecessors: block.predecessors().len(),
                    });
                }
                let mut covered = BTreeSet::new();
                for inc in incoming {
                    if !block.predecessors().contains(&inc.block) {
                        self.emit(at.0, at.1, ViolationKind::PhiIncomingNotPredecessor(inc.block));
                    }
                    if !covered.insert(inc.block) {
                        self.emit(at.0, at.1, ViolationKind::DuplicatePhiIncoming(inc.block));
                    }
                    if let Some(incoming_value) = function.value(inc.value) {
                        if incoming_value.ty() != value.ty() {
                            self.emit(at.0, at.1, ViolationKind::PhiTypeMismatch {
                                value: inc.value,
                                expected: value.ty().clone(),
                                found: incoming_value.ty().clone(),
                            });
                        }
                    }
                }
                for pred in block.predecessors().difference(&covered) {
                    self.emit(at.0, at.1, ViolationKind::PhiMissingPredecessor(*pred));
                }
            }
            _ => {}
        }

        self.check_comptime(at, value);
    }

    fn check_comptime(&mut self, at: (Option<BlockId>, Option<ValueId>), value: &Value) {
        let all_operands = || {
            value
                .kind()
                .operands()
                .iter()
                .all(|op| self.function.value(*op).is_some_and(Value::is_comptime))
        };
        let consistent = match value.kind() {
            ValueKind::Const(_) => value.is_comptime(),
            ValueKind::Binary { .. }
            | ValueKind::Unary { .. }
            | ValueKind::Call { .. }
            | ValueKind::Convert { .. } => value.is_comptime() == all_operands(),
            // Dropping an unreachable incoming edge may leave a phi
            // conservatively non-comptime, never the other way round.
            ValueKind::Phi { .. } => !value.is_comptime() || all_operands(),
            _ => !value.is_comptime(),
        };
        if !consistent {
            self.emit(at.0, at.1, ViolationKind::ComptimeMismatch);
        }
    }
}
