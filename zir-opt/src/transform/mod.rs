//! CFG Transformations
//!
//! Every transformation declines instead of failing: when its preconditions
//! do not hold it returns `None`, `false` or `0` and leaves the function
//! untouched. Passes that change the CFG shape invalidate any dominance
//! snapshot taken before them.

pub mod reachability;
pub mod merge;
pub mod threading;
pub mod critical_edges;
pub mod value_numbering;

pub use reachability::{
    back_edges, can_reach, get_reachable_blocks, has_cycle, remove_unreachable_blocks, unreachable_blocks,
};
pub use merge::{apply_merge, is_mergeable, is_safe_to_merge, merge_all_blocks, merge_blocks, try_merge_blocks};
pub use threading::{is_thread_safe, is_threadable, thread_jump, thread_jumps, thread_jumps_bounded};
pub use critical_edges::{
    find_critical_edges, is_critical_edge, split_all_critical_edges, split_critical_edge,
    split_function_critical_edges,
};
pub use value_numbering::{
    eliminate_dominated_redundancies, eliminate_local_redundancies, global_value_numbering,
    local_value_numbering, Redundancy, ValueNumbering,
};
