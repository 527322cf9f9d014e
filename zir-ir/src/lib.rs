//! ZIR - SSA Intermediate Representation
//! 
//! This crate defines the IR handed from the AST translator to the
//! optimizer and, once validated, to the machine-IR lowering.
//! 
//! ## Architecture
//! 
//! The crate is structured as follows:
//! - `types` - Resolved type tags
//! - `ops` - Binary and unary operations
//! - `values` - Values (instructions) as a single sum type
//! - `blocks` - Basic blocks and their edge sets
//! - `function` - Functions: the block arena and id allocator
//! - `module` - Modules of uniquely named functions
//! - `cfg` - The edge tracker, the only writer of predecessor/successor sets
//! - `builder` - IR construction utilities
//! - `validate` - Structural well-formedness checks

// Public exports - clean API surface
pub use self::types::IrType;
pub use self::ops::{BinaryOp, UnaryOp};
pub use self::values::{Constant, PhiIncoming, Value, ValueKind};
pub use self::blocks::BasicBlock;
pub use self::function::{Function, Parameter};
pub use self::module::Module;
pub use self::builder::IrBuilder;
pub use self::validate::{validate_function, validate_module, ValidationReport, Violation, ViolationKind};
pub use zir_common::{BlockId, IdAllocator, ValueId, ZirError};

mod types;
mod ops;
mod values;
mod blocks;
mod function;
mod module;
pub mod cfg;
mod builder;
pub mod validate;
