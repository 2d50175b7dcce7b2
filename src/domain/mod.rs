//! Domain models and graph algorithms for dagplan
//!
//! Contains the core scheduling logic without any I/O concerns.

mod critical_path;
mod graph;
mod id;
mod ordering;
mod schedule;
mod task;
mod traversal;
mod validate;

pub use critical_path::{critical_path, CriticalPath};
pub use graph::{format_cycle, DependencyGraph, GraphError};
pub use id::{IdError, TaskId, MAX_ID_LEN};
pub use ordering::{PriorityOrder, Ranking, TaskOrder, TieBreak};
pub use schedule::{dependency_depths, execution_levels, execution_order, topological_indices};
pub use task::{DependencyEdge, Priority, Task, TaskOrigin, TaskStatus};
pub use traversal::{
    ancestors, descendants, leaf_tasks, orphaned_tasks, OrphanPolicy, OrphanRule, Relative,
    Relatives,
};
pub use validate::{check_acyclic, cycles, find_cycle, validate, ValidationReport};
