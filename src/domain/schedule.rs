//! Topological scheduling
//!
//! Kahn's algorithm over the whole graph. When several tasks become ready
//! at once the one with the best policy rank goes first, so identical input
//! always yields the identical order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::graph::NodeIndex;
use tracing::debug;

use super::graph::{DependencyGraph, GraphError};
use super::id::TaskId;
use super::ordering::Ranking;
use super::validate::find_cycle;

/// Nodes in execution order: every prerequisite before its dependents
pub fn topological_indices(
    graph: &DependencyGraph,
    ranking: &Ranking,
) -> Result<Vec<NodeIndex>, GraphError> {
    let mut in_degree: Vec<usize> = graph.node_indices().map(|n| graph.in_degree(n)).collect();

    let mut ready: BinaryHeap<Reverse<usize>> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .map(|n| Reverse(ranking.rank(n)))
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(Reverse(rank)) = ready.pop() {
        let node = ranking.node(rank);
        order.push(node);

        for dependent in graph.dependent_indices(node) {
            let remaining = &mut in_degree[dependent.index()];
            *remaining -= 1;
            if *remaining == 0 {
                ready.push(Reverse(ranking.rank(dependent)));
            }
        }
    }

    if order.len() < graph.len() {
        debug!(
            scheduled = order.len(),
            total = graph.len(),
            "Scheduling stalled on a cycle"
        );
        let cycle = find_cycle(graph, ranking).unwrap_or_else(|| {
            graph
                .node_indices()
                .filter(|n| in_degree[n.index()] > 0)
                .map(|n| graph.id_at(n).clone())
                .collect()
        });
        return Err(GraphError::CircularDependency { cycle });
    }

    Ok(order)
}

/// Task ids in execution order
pub fn execution_order(
    graph: &DependencyGraph,
    ranking: &Ranking,
) -> Result<Vec<TaskId>, GraphError> {
    Ok(topological_indices(graph, ranking)?
        .into_iter()
        .map(|n| graph.id_at(n).clone())
        .collect())
}

/// Longest distance from a root for every node, indexed by node index
fn depths(graph: &DependencyGraph, order: &[NodeIndex]) -> Vec<u32> {
    let mut depth = vec![0u32; graph.len()];
    for &node in order {
        depth[node.index()] = graph
            .prerequisite_indices(node)
            .iter()
            .map(|p| depth[p.index()] + 1)
            .max()
            .unwrap_or(0);
    }
    depth
}

/// Dependency depth of every task: roots are 0, otherwise one more than the
/// deepest prerequisite
pub fn dependency_depths(
    graph: &DependencyGraph,
    ranking: &Ranking,
) -> Result<HashMap<TaskId, u32>, GraphError> {
    let order = topological_indices(graph, ranking)?;
    let depth = depths(graph, &order);

    Ok(graph
        .node_indices()
        .map(|n| (graph.id_at(n).clone(), depth[n.index()]))
        .collect())
}

/// Groups tasks into waves that can run in parallel. Wave `k` holds every
/// task at dependency depth `k`, ordered by policy rank.
pub fn execution_levels(
    graph: &DependencyGraph,
    ranking: &Ranking,
) -> Result<Vec<Vec<TaskId>>, GraphError> {
    let order = topological_indices(graph, ranking)?;
    let depth = depths(graph, &order);

    let mut levels: Vec<Vec<TaskId>> = Vec::new();
    for &node in ranking.nodes() {
        let level = depth[node.index()] as usize;
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(graph.id_at(node).clone());
    }

    Ok(levels)
}
