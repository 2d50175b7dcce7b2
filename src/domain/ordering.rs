//! Priority/ordering policy
//!
//! Every place that has to choose between several valid candidates (ready
//! tasks in the scheduler, tasks at the same traversal depth, equal-length
//! critical path predecessors) asks the same comparator. The comparator is
//! evaluated once per graph into a [`Ranking`] so all algorithms agree.

use std::cmp::Ordering;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use super::graph::DependencyGraph;
use super::task::Task;

/// A total order over tasks. Lesser sorts (and runs) first.
///
/// Any `Fn(&Task, &Task) -> Ordering` closure is a `TaskOrder`, so an
/// alternative policy is injected as a plain function.
///
/// Implementations must be consistent and transitive over the tasks of one
/// graph. Reporting distinct tasks as `Equal` is fine. A comparator that
/// contradicts itself (`a < b`, `b < c`, `c < a`) may make [`Ranking::new`]
/// panic.
pub trait TaskOrder {
    fn compare(&self, a: &Task, b: &Task) -> Ordering;
}

impl<F> TaskOrder for F
where
    F: Fn(&Task, &Task) -> Ordering,
{
    fn compare(&self, a: &Task, b: &Task) -> Ordering {
        self(a, b)
    }
}

/// Secondary key applied when priorities are equal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Earlier creation timestamp first, then lower id
    #[default]
    CreatedAt,
    /// Lower id first
    Id,
}

/// Default policy: higher priority first, then the configured tie-break,
/// then lower task id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityOrder {
    pub tie_break: TieBreak,
}

impl PriorityOrder {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }
}

impl TaskOrder for PriorityOrder {
    fn compare(&self, a: &Task, b: &Task) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| match self.tie_break {
                TieBreak::CreatedAt => a.created_at.cmp(&b.created_at),
                TieBreak::Id => Ordering::Equal,
            })
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Dense ranks of every node in a graph under a [`TaskOrder`]
///
/// Rank 0 is the task the policy prefers most. A comparator that reports
/// two distinct tasks as equal keeps their load order, so ranks are always
/// a total order.
#[derive(Debug, Clone)]
pub struct Ranking {
    rank: Vec<usize>,
    by_rank: Vec<NodeIndex>,
}

impl Ranking {
    /// Sorts the graph's nodes with `order`, stably
    ///
    /// # Panics
    ///
    /// May panic if `order` is not a total order.
    pub fn new(graph: &DependencyGraph, order: &dyn TaskOrder) -> Self {
        let mut by_rank: Vec<NodeIndex> = graph.node_indices().collect();
        by_rank.sort_by(|&a, &b| order.compare(graph.task_at(a), graph.task_at(b)));

        let mut rank = vec![0; by_rank.len()];
        for (position, idx) in by_rank.iter().enumerate() {
            rank[idx.index()] = position;
        }

        Self { rank, by_rank }
    }

    /// Rank of a node (lower is preferred)
    pub fn rank(&self, idx: NodeIndex) -> usize {
        self.rank[idx.index()]
    }

    /// Node holding the given rank
    pub fn node(&self, rank: usize) -> NodeIndex {
        self.by_rank[rank]
    }

    /// All nodes, most preferred first
    pub fn nodes(&self) -> &[NodeIndex] {
        &self.by_rank
    }

    /// Sorts nodes by rank in place
    pub fn sort(&self, nodes: &mut [NodeIndex]) {
        nodes.sort_by_key(|&idx| self.rank(idx));
    }

    /// Compares two nodes by rank
    pub fn compare(&self, a: NodeIndex, b: NodeIndex) -> Ordering {
        self.rank(a).cmp(&self.rank(b))
    }

    pub fn len(&self) -> usize {
        self.by_rank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rank.is_empty()
    }
}
