//! Error handling for the ZIR middle tier
//!
//! Construction of IR never produces partially valid objects: every
//! malformed request is rejected with a `ZirError`. Analyses that can stop
//! early report it through `FixpointResult` instead of an error.

use crate::types::{BlockId, ValueId};
use thiserror::Error;

/// Main error type for IR construction and pass execution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZirError {
    #[error("No current function")]
    NoCurrentFunction,

    #[error("No current block")]
    NoCurrentBlock,

    #[error("Unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("Unknown value {0}")]
    UnknownValue(ValueId),

    #[error("Value {0} is not a phi")]
    NotAPhi(ValueId),

    #[error("Value {0} does not have a pointer type")]
    NotAPointer(ValueId),

    #[error("Block {0} already ends with a terminator")]
    TerminatorAlreadyPresent(BlockId),

    #[error("Block {0} has no terminator")]
    MissingTerminator(BlockId),

    #[error("Phi arity mismatch: {blocks} incoming blocks, {values} incoming values")]
    PhiArityMismatch { blocks: usize, values: usize },

    #[error("Duplicate block label '{0}'")]
    DuplicateLabel(String),

    #[error("Duplicate function '{0}'")]
    DuplicateFunction(String),

    #[error("Empty {0} name")]
    EmptyName(&'static str),

    #[error("Function '{0}' has no blocks")]
    EmptyFunction(String),

    #[error("Validation failed after {pass}: {violations} violation(s)")]
    Validation { pass: String, violations: usize },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ZirError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ZirError::InternalError {
            message: message.into(),
        }
    }
}

/// Convert from String (for simple error cases)
impl From<String> for ZirError {
    fn from(message: String) -> Self {
        ZirError::InternalError { message }
    }
}

/// Outcome of a capped fixpoint iteration.
///
/// `Partial` carries the best snapshot reached when the round cap was hit;
/// callers decide whether a truncated result is good enough.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum FixpointResult<T> {
    Converged(T),
    Partial(T),
}

impl<T> FixpointResult<T> {
    pub fn is_converged(&self) -> bool {
        matches!(self, FixpointResult::Converged(_))
    }

    pub fn get(&self) -> &T {
        match self {
            FixpointResult::Converged(value) | FixpointResult::Partial(value) => value,
        }
    }

    /// Take the result regardless of convergence
    pub fn into_inner(self) -> T {
        match self {
            FixpointResult::Converged(value) | FixpointResult::Partial(value) => value,
        }
    }

    /// Take the result only if the iteration converged
    pub fn converged(self) -> Option<T> {
        match self {
            FixpointResult::Converged(value) => Some(value),
            FixpointResult::Partial(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FixpointResult<U> {
        match self {
            FixpointResult::Converged(value) => FixpointResult::Converged(f(value)),
            FixpointResult::Partial(value) => FixpointResult::Partial(f(value)),
        }
    }
}
