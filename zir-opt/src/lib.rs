//! ZIR - Analyses and CFG Transformations
//! 
//! Everything here works on one `zir_ir::Function` at a time and is
//! single-threaded. Analyses (`dominance`, `ssa::PhiPlacement`) are
//! snapshots of a CFG shape: recompute them after any transformation that
//! adds, removes or rewires blocks.
//! 
//! - `dominance` - Dominators, immediate dominators, frontiers, post-dominators
//! - `ssa` - Variable version table and phi construction
//! - `transform` - Reachability, merging, jump threading, critical edges, value numbering
//! - `pipeline` - Configured pass sequence with validation between passes

pub mod dominance;
pub mod ssa;
pub mod transform;
pub mod pipeline;

pub use dominance::{reverse_postorder, DominanceInfo, PostDominanceInfo, DEFAULT_ROUND_CAP};
pub use ssa::{PhiPlacement, VariableTable, VersionSnapshot};
pub use pipeline::{OptConfig, PassEvent, PassKind, PassPipeline, PipelineSummary};
