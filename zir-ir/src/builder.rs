//! IR Builder
//!
//! Provides utilities for constructing IR programmatically. This is the
//! surface the AST translator drives: one function at a time, appending to
//! a current block. Result types are derived from operands where the kind
//! determines them; everything else is passed in already resolved.

use zir_common::{BlockId, ValueId, ZirError};
use crate::{BinaryOp, Constant, Function, IrType, PhiIncoming, UnaryOp, ValueKind};

/// Builder for constructing IR
pub struct IrBuilder {
    current_function: Option<Function>,
    current_block: Option<BlockId>,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            current_function: None,
            current_block: None,
        }
    }

    /// Start a new function, dropping any unfinished one
    pub fn create_function(&mut self, name: impl Into<String>, return_type: IrType) -> &mut Function {
        self.current_block = None;
        self.current_function.insert(Function::new(name, return_type))
    }

    pub fn function(&self) -> Option<&Function> {
        self.current_function.as_ref()
    }

    pub fn function_mut(&mut self) -> Option<&mut Function> {
        self.current_function.as_mut()
    }

    fn func(&self) -> Result<&Function, ZirError> {
        self.current_function.as_ref().ok_or(ZirError::NoCurrentFunction)
    }

    fn func_mut(&mut self) -> Result<&mut Function, ZirError> {
        self.current_function.as_mut().ok_or(ZirError::NoCurrentFunction)
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, ty: IrType) -> Result<(), ZirError> {
        self.func_mut()?.add_parameter(name, ty)
    }

    /// Create a block without moving the insertion point
    pub fn create_block(&mut self, label: impl Into<String>) -> Result<BlockId, ZirError> {
        self.func_mut()?.create_block(label)
    }

    /// Continue appending at the end of `block`
    pub fn position_at_end(&mut self, block: BlockId) -> Result<(), ZirError> {
        if !self.func()?.contains_block(block) {
            return Err(ZirError::UnknownBlock(block));
        }
        self.current_block = Some(block);
        Ok(())
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    /// Type of an existing value of the current function
    pub fn value_type(&self, id: ValueId) -> Result<IrType, ZirError> {
        self.func()?
            .value(id)
            .map(|v| v.ty().clone())
            .ok_or(ZirError::UnknownValue(id))
    }

    fn add_instruction(&mut self, ty: IrType, kind: ValueKind) -> Result<ValueId, ZirError> {
        let block = self.current_block.ok_or(ZirError::NoCurrentBlock)?;
        self.func_mut()?.append(block, ty, kind)
    }

    pub fn build_const(&mut self, value: Constant, ty: IrType) -> Result<ValueId, ZirError> {
        self.add_instruction(ty, ValueKind::Const(value))
    }

    pub fn build_int(&mut self, value: i64, ty: IrType) -> Result<ValueId, ZirError> {
        self.build_const(Constant::Int(value), ty)
    }

    pub fn build_bool(&mut self, value: bool) -> Result<ValueId, ZirError> {
        self.build_const(Constant::Bool(value), IrType::Bool)
    }

    /// Named variable slot; the value is a pointer to `var_type`
    pub fn build_local(&mut self, name: impl Into<String>, var_type: IrType) -> Result<ValueId, ZirError> {
        self.add_instruction(var_type.ptr_to(), ValueKind::Local { name: name.into() })
    }

    pub fn build_load(&mut self, ptr: ValueId) -> Result<ValueId, ZirError> {
        let ty = self
            .value_type(ptr)?
            .pointee()
            .cloned()
            .ok_or(ZirError::NotAPointer(ptr))?;
        self.add_instruction(ty, ValueKind::Load { ptr })
    }

    pub fn build_store(&mut self, ptr: ValueId, value: ValueId) -> Result<ValueId, ZirError> {
        if !self.value_type(ptr)?.is_pointer() {
            return Err(ZirError::NotAPointer(ptr));
        }
        self.add_instruction(IrType::Void, ValueKind::Store { ptr, value })
    }

    pub fn build_alloca(&mut self, allocated: IrType) -> Result<ValueId, ZirError> {
        self.add_instruction(allocated.clone().ptr_to(), ValueKind::Alloca { allocated })
    }

    pub fn build_binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> Result<ValueId, ZirError> {
        let lhs_type = self.value_type(lhs)?;
        self.value_type(rhs)?;
        let ty = if op.is_comparison() { IrType::Bool } else { lhs_type };
        self.add_instruction(ty, ValueKind::Binary { op, lhs, rhs })
    }

    pub fn build_unary(&mut self, op: UnaryOp, operand: ValueId) -> Result<ValueId, ZirError> {
        let ty = match op {
            UnaryOp::Not => IrType::Bool,
            UnaryOp::Neg | UnaryOp::BitNot => self.value_type(operand)?,
        };
        self.add_instruction(ty, ValueKind::Unary { op, operand })
    }

    pub fn build_call(&mut self, callee: impl Into<String>, args: Vec<ValueId>, return_type: IrType) -> Result<ValueId, ZirError> {
        self.add_instruction(return_type, ValueKind::Call { callee: callee.into(), args })
    }

    pub fn build_convert(&mut self, operand: ValueId, to: IrType) -> Result<ValueId, ZirError> {
        self.add_instruction(to, ValueKind::Convert { operand })
    }

    pub fn build_branch(&mut self, condition: ValueId, then_block: BlockId, else_block: BlockId) -> Result<ValueId, ZirError> {
        self.add_instruction(IrType::Void, ValueKind::Branch { condition, then_block, else_block })
    }

    pub fn build_jump(&mut self, target: BlockId) -> Result<ValueId, ZirError> {
        self.add_instruction(IrType::Void, ValueKind::Jump { target })
    }

    pub fn build_return(&mut self, value: Option<ValueId>) -> Result<ValueId, ZirError> {
        self.add_instruction(IrType::Void, ValueKind::Return { value })
    }

    /// Build a phi at the head of `block`. `blocks[i]` pairs with `values[i]`;
    /// either list may be shorter than the block's predecessor count while
    /// a loop is still open (see `add_phi_incoming`).
    pub fn build_phi(&mut self, block: BlockId, ty: IrType, blocks: &[BlockId], values: &[ValueId]) -> Result<ValueId, ZirError> {
        if blocks.len() != values.len() {
            return Err(ZirError::PhiArityMismatch { blocks: blocks.len(), values: values.len() });
        }
        let incoming = blocks
            .iter()
            .zip(values)
            .map(|(block, value)| PhiIncoming { block: *block, value: *value })
            .collect();
        self.func_mut()?.append(block, ty, ValueKind::Phi { incoming })
    }

    pub fn add_phi_incoming(&mut self, phi: ValueId, block: BlockId, value: ValueId) -> Result<(), ZirError> {
        self.func_mut()?.add_phi_incoming(phi, block, value)
    }

    pub fn current_block_has_terminator(&self) -> bool {
        match (&self.current_function, self.current_block) {
            (Some(function), Some(block_id)) => function
                .block(block_id)
                .is_some_and(|block| block.has_terminator()),
            _ => false,
        }
    }

    pub fn finish_function(&mut self) -> Option<Function> {
        self.current_block = None;
        self.current_function.take()
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
