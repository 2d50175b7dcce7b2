//! # Analysis Layer
//!
//! Entry points callers use to analyze the task graph. Each [`Analyzer`]
//! wraps one immutable [`Snapshot`]; the [`SnapshotCache`] shares analyzers
//! between calls while the underlying store is unchanged.
//!
//! Parameter checks (`max_depth`, unknown ids in subsets) run before any
//! graph work, and the graph is validated once per snapshot.

mod analyzer;
mod snapshot;
mod snapshot_cache;

pub use analyzer::{AnalysisOptions, Analyzer};
pub use snapshot::Snapshot;
pub use snapshot_cache::SnapshotCache;
