//! Reachability queries
//!
//! Breadth-first walks over prerequisites (ancestors) or dependents
//! (descendants), plus orphan and leaf detection.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::graph::{DependencyGraph, GraphError};
use super::id::TaskId;
use super::ordering::Ranking;
use super::task::{TaskOrigin, TaskStatus};

/// A task reached by a walk, with its distance from the seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relative {
    pub id: TaskId,
    pub depth: usize,
}

/// Result of an ancestor or descendant walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relatives {
    pub seed: TaskId,
    pub max_depth: usize,
    /// Ordered by depth, then policy rank
    pub tasks: Vec<Relative>,
    /// Distinct tasks one step past `max_depth` that were not included
    pub beyond_limit: usize,
}

impl Relatives {
    /// The ids reached, in result order
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|r| r.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// All transitive prerequisites of `seed`, direct prerequisites at depth 1
pub fn ancestors(
    graph: &DependencyGraph,
    ranking: &Ranking,
    seed: &TaskId,
    max_depth: usize,
) -> Result<Relatives, GraphError> {
    walk(graph, ranking, seed, max_depth, Direction::Incoming)
}

/// All transitive dependents of `seed`, direct dependents at depth 1
pub fn descendants(
    graph: &DependencyGraph,
    ranking: &Ranking,
    seed: &TaskId,
    max_depth: usize,
) -> Result<Relatives, GraphError> {
    walk(graph, ranking, seed, max_depth, Direction::Outgoing)
}

fn walk(
    graph: &DependencyGraph,
    ranking: &Ranking,
    seed: &TaskId,
    max_depth: usize,
    direction: Direction,
) -> Result<Relatives, GraphError> {
    let start = graph.require(seed)?;

    let mut visited = vec![false; graph.len()];
    visited[start.index()] = true;

    let mut tasks = Vec::new();
    let mut beyond_limit = 0;
    let mut frontier = vec![start];
    let mut depth = 0;

    while !frontier.is_empty() {
        let mut next: Vec<NodeIndex> = Vec::new();
        for &node in &frontier {
            for neighbor in graph.neighbors(node, direction) {
                if !visited[neighbor.index()] {
                    visited[neighbor.index()] = true;
                    next.push(neighbor);
                }
            }
        }

        if next.is_empty() {
            break;
        }
        depth += 1;
        if depth > max_depth {
            beyond_limit = next.len();
            break;
        }

        ranking.sort(&mut next);
        tasks.extend(next.iter().map(|&n| Relative {
            id: graph.id_at(n).clone(),
            depth,
        }));
        frontier = next;
    }

    Ok(Relatives {
        seed: seed.clone(),
        max_depth,
        tasks,
        beyond_limit,
    })
}

/// Which graph shape makes a task an orphan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanRule {
    /// No parent and no prerequisites
    #[default]
    NoPrerequisites,
    /// No parent and no edges in either direction
    Isolated,
}

/// Orphan detection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrphanPolicy {
    pub rule: OrphanRule,
    /// Origins treated as intentional roots, never reported
    pub exclude_origins: Vec<TaskOrigin>,
}

impl Default for OrphanPolicy {
    fn default() -> Self {
        Self {
            rule: OrphanRule::default(),
            exclude_origins: vec![TaskOrigin::Human],
        }
    }
}

impl OrphanPolicy {
    fn is_orphan(&self, graph: &DependencyGraph, node: NodeIndex) -> bool {
        let task = graph.task_at(node);
        if task.parent.is_some() || self.exclude_origins.contains(&task.origin) {
            return false;
        }

        let no_prerequisites = graph.in_degree(node) == 0;
        match self.rule {
            OrphanRule::NoPrerequisites => no_prerequisites,
            OrphanRule::Isolated => no_prerequisites && graph.dependent_indices(node).is_empty(),
        }
    }
}

/// Tasks the policy considers orphaned, in policy order
pub fn orphaned_tasks(
    graph: &DependencyGraph,
    ranking: &Ranking,
    policy: &OrphanPolicy,
) -> Vec<TaskId> {
    ranking
        .nodes()
        .iter()
        .filter(|&&n| policy.is_orphan(graph, n))
        .map(|&n| graph.id_at(n).clone())
        .collect()
}

/// Tasks nothing depends on, optionally only those with `status`
pub fn leaf_tasks(
    graph: &DependencyGraph,
    ranking: &Ranking,
    status: Option<TaskStatus>,
) -> Vec<TaskId> {
    ranking
        .nodes()
        .iter()
        .filter(|&&n| graph.dependent_indices(n).is_empty())
        .filter(|&&n| status.map_or(true, |s| graph.task_at(n).status == s))
        .map(|&n| graph.id_at(n).clone())
        .collect()
}
