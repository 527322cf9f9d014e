//! ZIR - Common Types and Utilities
//! 
//! This crate contains the identifiers, id allocator and error definitions
//! shared by the IR data model and the analysis/transformation passes.

pub mod error;
pub mod types;

pub use error::{FixpointResult, ZirError};
pub use types::*;
