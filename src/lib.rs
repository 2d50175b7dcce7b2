//! dagplan - Dependency-aware task planning
//!
//! Tasks and their prerequisite edges form a DAG. dagplan validates it,
//! produces deterministic execution orders, computes critical paths and
//! answers reachability questions (ancestors, descendants, orphans, leaves).
//! Tasks live in a git-friendly JSONL file with an optional SQLite mirror.

pub mod analysis;
pub mod cli;
pub mod domain;
pub mod storage;

pub use analysis::{AnalysisOptions, Analyzer};
pub use domain::{DependencyEdge, DependencyGraph, GraphError, Task, TaskId, TaskStatus};
