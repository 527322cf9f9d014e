//! Common types used throughout the IR
//!
//! Blocks and values live in per-function arenas and are referred to by
//! small opaque handles. Handles are plain data: copying one never copies
//! or shares the entity it names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a basic block inside its function's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Handle of a value (instruction) inside its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl BlockId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl ValueId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Hands out block and value ids.
///
/// Every function owns one allocator, so ids are deterministic for a given
/// sequence of construction calls and never depend on process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next_block: u32,
    next_value: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_block: 0,
            next_value: 0,
        }
    }

    /// Generate a new unique block id
    pub fn next_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    /// Generate a new unique value id
    pub fn next_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    /// Number of block ids handed out so far
    pub fn blocks_allocated(&self) -> u32 {
        self.next_block
    }

    /// Number of value ids handed out so far
    pub fn values_allocated(&self) -> u32 {
        self.next_value
    }
}
