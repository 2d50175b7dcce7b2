//! Critical path: the longest-duration chain of dependent tasks
//!
//! Longest path in a DAG by dynamic programming over the scheduler's
//! topological order. `finish[v]` is the largest total duration of any chain
//! ending in `v`, including `v` itself.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::Serialize;
use tracing::debug;

use super::graph::{DependencyGraph, GraphError};
use super::id::TaskId;
use super::ordering::Ranking;
use super::schedule::topological_indices;

/// The longest chain and the sum of its estimated durations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CriticalPath {
    pub path: Vec<TaskId>,
    pub total_duration: u64,
}

/// Marks every node reachable from `from` (including itself)
fn reachable(graph: &DependencyGraph, from: NodeIndex, direction: Direction) -> Vec<bool> {
    let mut seen = vec![false; graph.len()];
    seen[from.index()] = true;
    let mut stack = vec![from];

    while let Some(node) = stack.pop() {
        for next in graph.neighbors(node, direction) {
            if !seen[next.index()] {
                seen[next.index()] = true;
                stack.push(next);
            }
        }
    }

    seen
}

/// Computes the critical path, optionally pinned to a start and/or end task
///
/// With `start`, only tasks reachable from it are considered; with `end`,
/// only tasks that lead to it. Equal-length alternatives are resolved by
/// policy rank.
pub fn critical_path(
    graph: &DependencyGraph,
    ranking: &Ranking,
    start: Option<&TaskId>,
    end: Option<&TaskId>,
) -> Result<CriticalPath, GraphError> {
    let start_idx = start.map(|id| graph.require(id)).transpose()?;
    let end_idx = end.map(|id| graph.require(id)).transpose()?;

    let order = topological_indices(graph, ranking)?;

    let mut in_scope = vec![true; graph.len()];
    if let Some(s) = start_idx {
        for (slot, hit) in in_scope.iter_mut().zip(reachable(graph, s, Direction::Outgoing)) {
            *slot &= hit;
        }
    }
    if let Some(e) = end_idx {
        for (slot, hit) in in_scope.iter_mut().zip(reachable(graph, e, Direction::Incoming)) {
            *slot &= hit;
        }
    }

    if let (Some(s), Some(e)) = (start_idx, end_idx) {
        if !in_scope[e.index()] {
            return Err(GraphError::NoPathExists {
                start: graph.id_at(s).clone(),
                end: graph.id_at(e).clone(),
            });
        }
    }

    let mut finish = vec![0u64; graph.len()];
    let mut predecessor: Vec<Option<NodeIndex>> = vec![None; graph.len()];

    for &node in order.iter().filter(|n| in_scope[n.index()]) {
        let mut best: Option<NodeIndex> = None;
        for prereq in graph.prerequisite_indices(node) {
            if !in_scope[prereq.index()] {
                continue;
            }
            best = match best {
                Some(current)
                    if finish[current.index()] > finish[prereq.index()]
                        || (finish[current.index()] == finish[prereq.index()]
                            && ranking.compare(current, prereq).is_lt()) =>
                {
                    Some(current)
                }
                _ => Some(prereq),
            };
        }

        let before = best.map_or(0, |b| finish[b.index()]);
        finish[node.index()] = before.saturating_add(graph.task_at(node).duration());
        predecessor[node.index()] = best;
    }

    // Zero-duration tasks tie with their prerequisite, so among equal
    // finishes a task with no in-scope dependents ends the path.
    let is_sink = |n: NodeIndex| {
        !graph
            .neighbors(n, Direction::Outgoing)
            .iter()
            .any(|d| in_scope[d.index()])
    };
    let last = end_idx.or_else(|| {
        ranking
            .nodes()
            .iter()
            .copied()
            .filter(|n| in_scope[n.index()])
            .fold(None, |best: Option<NodeIndex>, n| match best {
                Some(b) if (finish[b.index()], is_sink(b)) >= (finish[n.index()], is_sink(n)) => {
                    Some(b)
                }
                _ => Some(n),
            })
    });

    let Some(last) = last else {
        return Ok(CriticalPath::default());
    };

    let mut path = vec![graph.id_at(last).clone()];
    let mut cursor = last;
    while let Some(prev) = predecessor[cursor.index()] {
        path.push(graph.id_at(prev).clone());
        cursor = prev;
    }
    path.reverse();

    debug!(
        len = path.len(),
        total = finish[last.index()],
        "Computed critical path"
    );

    Ok(CriticalPath {
        path,
        total_duration: finish[last.index()],
    })
}
