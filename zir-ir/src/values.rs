//! IR Values
//!
//! Every instruction is a value: one sum type matched exhaustively by every
//! pass. Operands refer to other values of the same function by `ValueId`
//! and to blocks by `BlockId`.

use serde::{Deserialize, Serialize};
use std::fmt;
use zir_common::{BlockId, ValueId};
use crate::{BinaryOp, IrType, UnaryOp};

/// Compile-time constant payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(val) => write!(f, "{val}"),
            Constant::Float(val) => write!(f, "{val:?}"),
            Constant::Bool(val) => write!(f, "{val}"),
        }
    }
}

/// One `[value, predecessor]` pair of a phi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhiIncoming {
    pub block: BlockId,
    pub value: ValueId,
}

/// Kind-specific payload of a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Literal constant
    Const(Constant),

    /// Named local variable slot (parameter or local); its type is a pointer
    Local { name: String },

    /// Load from memory: load ptr
    Load { ptr: ValueId },

    /// Store to memory: store value, ptr
    Store { ptr: ValueId, value: ValueId },

    /// Binary operation: op lhs, rhs
    Binary { op: BinaryOp, lhs: ValueId, rhs: ValueId },

    /// Unary operation: op operand
    Unary { op: UnaryOp, operand: ValueId },

    /// Direct call by function name
    Call { callee: String, args: Vec<ValueId> },

    /// Conditional branch: br condition, then_block, else_block
    Branch { condition: ValueId, then_block: BlockId, else_block: BlockId },

    /// Unconditional branch
    Jump { target: BlockId },

    /// Return: ret value or ret void
    Return { value: Option<ValueId> },

    /// Stack slot of the allocated type; the value is a pointer to it
    Alloca { allocated: IrType },

    /// Conversion of operand to the value's own type
    Convert { operand: ValueId },

    /// Phi node: phi [val1, block1], [val2, block2], ...
    Phi { incoming: Vec<PhiIncoming> },
}

impl ValueKind {
    /// Branch, Jump and Return end a block
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            ValueKind::Branch { .. } | ValueKind::Jump { .. } | ValueKind::Return { .. }
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, ValueKind::Phi { .. })
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(self, ValueKind::Branch { .. })
    }

    /// Values this instruction reads, in operand order
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            ValueKind::Const(_) | ValueKind::Local { .. } | ValueKind::Alloca { .. } => Vec::new(),
            ValueKind::Jump { .. } => Vec::new(),
            ValueKind::Load { ptr } => vec![*ptr],
            ValueKind::Store { ptr, value } => vec![*ptr, *value],
            ValueKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ValueKind::Unary { operand, .. } | ValueKind::Convert { operand } => vec![*operand],
            ValueKind::Call { args, .. } => args.clone(),
            ValueKind::Branch { condition, .. } => vec![*condition],
            ValueKind::Return { value } => value.iter().copied().collect(),
            ValueKind::Phi { incoming } => incoming.iter().map(|inc| inc.value).collect(),
        }
    }

    /// Blocks this instruction names: branch targets and phi predecessors
    pub fn block_refs(&self) -> Vec<BlockId> {
        match self {
            ValueKind::Phi { incoming } => incoming.iter().map(|inc| inc.block).collect(),
            _ => self.block_targets(),
        }
    }

    /// Control-flow targets of a terminator, deduplicated in order
    pub fn block_targets(&self) -> Vec<BlockId> {
        match self {
            ValueKind::Jump { target } => vec![*target],
            ValueKind::Branch { then_block, else_block, .. } => {
                if then_block == else_block {
                    vec![*then_block]
                } else {
                    vec![*then_block, *else_block]
                }
            }
            _ => Vec::new(),
        }
    }

    /// Short opcode name, used by value numbering and display
    pub fn opcode(&self) -> &'static str {
        match self {
            ValueKind::Const(_) => "const",
            ValueKind::Local { .. } => "local",
            ValueKind::Load { .. } => "load",
            ValueKind::Store { .. } => "store",
            ValueKind::Binary { .. } => "binary",
            ValueKind::Unary { .. } => "unary",
            ValueKind::Call { .. } => "call",
            ValueKind::Branch { .. } => "br",
            ValueKind::Jump { .. } => "jmp",
            ValueKind::Return { .. } => "ret",
            ValueKind::Alloca { .. } => "alloca",
            ValueKind::Convert { .. } => "convert",
            ValueKind::Phi { .. } => "phi",
        }
    }

    /// Same kind with every operand passed through `f`
    pub fn map_operands(&self, mut f: impl FnMut(ValueId) -> ValueId) -> ValueKind {
        match self {
            ValueKind::Const(_) | ValueKind::Local { .. } | ValueKind::Alloca { .. }
            | ValueKind::Jump { .. } => self.clone(),
            ValueKind::Load { ptr } => ValueKind::Load { ptr: f(*ptr) },
            ValueKind::Store { ptr, value } => ValueKind::Store { ptr: f(*ptr), value: f(*value) },
            ValueKind::Binary { op, lhs, rhs } => ValueKind::Binary { op: *op, lhs: f(*lhs), rhs: f(*rhs) },
            ValueKind::Unary { op, operand } => ValueKind::Unary { op: *op, operand: f(*operand) },
            ValueKind::Convert { operand } => ValueKind::Convert { operand: f(*operand) },
            ValueKind::Call { callee, args } => ValueKind::Call {
                callee: callee.clone(),
                args: args.iter().map(|arg| f(*arg)).collect(),
            },
            ValueKind::Branch { condition, then_block, else_block } => ValueKind::Branch {
                condition: f(*condition),
                then_block: *then_block,
                else_block: *else_block,
            },
            ValueKind::Return { value } => ValueKind::Return { value: value.map(&mut f) },
            ValueKind::Phi { incoming } => ValueKind::Phi {
                incoming: incoming
                    .iter()
                    .map(|inc| PhiIncoming { block: inc.block, value: f(inc.value) })
                    .collect(),
            },
        }
    }

    /// Same kind with every named block passed through `f`
    pub fn map_blocks(&self, mut f: impl FnMut(BlockId) -> BlockId) -> ValueKind {
        match self {
            ValueKind::Jump { target } => ValueKind::Jump { target: f(*target) },
            ValueKind::Branch { condition, then_block, else_block } => ValueKind::Branch {
                condition: *condition,
                then_block: f(*then_block),
                else_block: f(*else_block),
            },
            ValueKind::Phi { incoming } => ValueKind::Phi {
                incoming: incoming
                    .iter()
                    .map(|inc| PhiIncoming { block: f(inc.block), value: inc.value })
                    .collect(),
            },
            other => other.clone(),
        }
    }
}

/// A value: one instruction of a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    id: ValueId,
    ty: IrType,
    is_comptime: bool,
    kind: ValueKind,
}

impl Value {
    /// Values are only built by `Function`, which resolves the comptime
    /// flag from the operands.
    pub(crate) fn new(id: ValueId, ty: IrType, is_comptime: bool, kind: ValueKind) -> Self {
        Self { id, ty, is_comptime, kind }
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn ty(&self) -> &IrType {
        &self.ty
    }

    pub fn is_comptime(&self) -> bool {
        self.is_comptime
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    pub fn is_phi(&self) -> bool {
        self.kind.is_phi()
    }

    /// Rebuild with a kind of the same variant (operand or block rewrite)
    pub(crate) fn with_kind(&self, kind: ValueKind) -> Value {
        debug_assert_eq!(
            std::mem::discriminant(&self.kind),
            std::mem::discriminant(&kind)
        );
        Value { id: self.id, ty: self.ty.clone(), is_comptime: self.is_comptime, kind }
    }

    pub(crate) fn set_comptime(&mut self, is_comptime: bool) {
        self.is_comptime = is_comptime;
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 { write!(f, ", ")?; }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id;
        let ty = &self.ty;
        let ct = if self.is_comptime { "comptime " } else { "" };
        match &self.kind {
            ValueKind::Const(c) => write!(f, "{id} = {ct}const {ty} {c}"),
            ValueKind::Local { name } => write!(f, "{id} = local {ty} {name}"),
            ValueKind::Load { ptr } => write!(f, "{id} = load {ty}, {ptr}"),
            ValueKind::Store { ptr, value } => write!(f, "store {value}, {ptr}"),
            ValueKind::Binary { op, lhs, rhs } => write!(f, "{id} = {ct}{op} {ty} {lhs}, {rhs}"),
            ValueKind::Unary { op, operand } => write!(f, "{id} = {ct}{op} {ty} {operand}"),
            ValueKind::Call { callee, args } => {
                if !matches!(ty, IrType::Void) {
                    write!(f, "{id} = ")?;
                }
                write!(f, "{ct}call {ty} @{callee}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ValueKind::Branch { condition, then_block, else_block } => {
                write!(f, "br {condition}, {then_block}, {else_block}")
            }
            ValueKind::Jump { target } => write!(f, "jmp {target}"),
            ValueKind::Return { value: Some(value) } => write!(f, "ret {value}"),
            ValueKind::Return { value: None } => write!(f, "ret void"),
            ValueKind::Alloca { allocated } => write!(f, "{id} = alloca {allocated}"),
            ValueKind::Convert { operand } => write!(f, "{id} = {ct}convert {operand} to {ty}"),
            ValueKind::Phi { incoming } => {
                write!(f, "{id} = {ct}phi {ty} ")?;
                for (i, inc) in incoming.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "[{}, {}]", inc.value, inc.block)?;
                }
                Ok(())
            }
        }
    }
}
