//! Dependency graph for tasks
//!
//! An immutable adjacency structure built from a snapshot of tasks and
//! prerequisite edges. Uses petgraph for storage; edges point from the
//! prerequisite to the dependent, so "incoming" neighbours are the tasks that
//! must finish first.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::id::{IdError, TaskId};
use super::task::{DependencyEdge, Task};

/// Errors raised by graph construction and analysis
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphError {
    #[error("Task not found: {id}")]
    UnknownTask { id: TaskId },

    #[error("Broken reference to missing task {missing} ({edge})")]
    BrokenReference {
        missing: TaskId,
        edge: DependencyEdge,
    },

    #[error("Self-dependency not allowed: {id}")]
    SelfDependency { id: TaskId },

    #[error("Circular dependency detected: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<TaskId> },

    #[error("No path exists from {start} to {end}")]
    NoPathExists { start: TaskId, end: TaskId },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },
}

impl GraphError {
    /// Creates an `InvalidParameter` error
    pub fn invalid(message: impl Into<String>) -> Self {
        GraphError::InvalidParameter {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::UnknownTask { .. } => "unknown_task",
            GraphError::BrokenReference { .. } => "broken_reference",
            GraphError::SelfDependency { .. } => "self_dependency",
            GraphError::CircularDependency { .. } => "circular_dependency",
            GraphError::NoPathExists { .. } => "no_path_exists",
            GraphError::InvalidParameter { .. } => "invalid_parameter",
        }
    }
}

impl From<IdError> for GraphError {
    fn from(err: IdError) -> Self {
        GraphError::invalid(err.to_string())
    }
}

/// Renders a cycle as `a -> b -> c -> a`
pub fn format_cycle(cycle: &[TaskId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// A dependency graph for tasks
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// The underlying directed graph (prerequisite -> dependent)
    graph: DiGraph<Task, ()>,

    /// Map from TaskId to node index
    node_map: HashMap<TaskId, NodeIndex>,

    /// Prerequisite ids that are not in the graph, per dependent
    unresolved: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            unresolved: HashMap::new(),
        }
    }

    /// Builds a graph, failing on the first invalid edge
    pub fn build(
        tasks: impl IntoIterator<Item = Task>,
        edges: &[DependencyEdge],
    ) -> Result<Self, GraphError> {
        let (graph, mut problems) = Self::build_lenient(tasks, edges);
        if problems.is_empty() {
            Ok(graph)
        } else {
            Err(problems.swap_remove(0))
        }
    }

    /// Builds a graph from tasks using each task's own `depends_on` list
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self, GraphError> {
        let tasks: Vec<Task> = tasks.into_iter().collect();
        let edges: Vec<DependencyEdge> = tasks.iter().flat_map(Task::edges).collect();
        Self::build(tasks, &edges)
    }

    /// Builds a graph, skipping invalid edges and returning every problem
    /// found, in edge order
    pub fn build_lenient(
        tasks: impl IntoIterator<Item = Task>,
        edges: &[DependencyEdge],
    ) -> (Self, Vec<GraphError>) {
        let mut graph = Self::new();
        let mut problems = Vec::new();

        // First pass: add all nodes
        for task in tasks {
            graph.add_task(task);
        }

        // Second pass: add all edges
        for edge in edges {
            if let Err(problem) = graph.add_edge(edge) {
                debug!(%edge, error = %problem, "Skipping invalid dependency edge");
                problems.push(problem);
            }
        }

        debug!(
            tasks = graph.len(),
            edges = graph.edge_count(),
            problems = problems.len(),
            "Built dependency graph"
        );

        (graph, problems)
    }

    /// Adds a task; a second record with the same ID replaces the first
    /// but keeps its load position
    fn add_task(&mut self, task: Task) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&task.id) {
            debug!(id = %task.id, "Duplicate task record, keeping the latest");
            self.graph[idx] = task;
            return idx;
        }
        let id = task.id.clone();
        let idx = self.graph.add_node(task);
        self.node_map.insert(id, idx);
        idx
    }

    /// Adds a prerequisite edge. Duplicate edges collapse into one.
    fn add_edge(&mut self, edge: &DependencyEdge) -> Result<(), GraphError> {
        if edge.is_self_edge() {
            return Err(GraphError::SelfDependency {
                id: edge.dependent.clone(),
            });
        }

        let dependent = self.broken_unless_present(&edge.dependent, edge)?;
        let prerequisite = self
            .broken_unless_present(&edge.prerequisite, edge)
            .inspect_err(|_| {
                let missing = self.unresolved.entry(edge.dependent.clone()).or_default();
                if !missing.contains(&edge.prerequisite) {
                    missing.push(edge.prerequisite.clone());
                }
            })?;

        // Edge: prerequisite -> dependent
        self.graph.update_edge(prerequisite, dependent, ());
        Ok(())
    }

    fn broken_unless_present(
        &self,
        id: &TaskId,
        edge: &DependencyEdge,
    ) -> Result<NodeIndex, GraphError> {
        self.index_of(id)
            .ok_or_else(|| GraphError::BrokenReference {
                missing: id.clone(),
                edge: edge.clone(),
            })
    }

    /// Returns true if adding "`task` depends on `depends_on`" would close a
    /// cycle, i.e. `depends_on` is already reachable from `task`
    pub fn would_create_cycle(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
    ) -> Result<bool, GraphError> {
        if task == depends_on {
            return Err(GraphError::SelfDependency { id: task.clone() });
        }
        let task_idx = self.require(task)?;
        let dep_idx = self.require(depends_on)?;

        Ok(has_path_connecting(&self.graph, task_idx, dep_idx, None))
    }

    /// The cycle that adding "`task` depends on `depends_on`" would close,
    /// in prerequisite -> dependent order starting at `task`. The new edge
    /// runs from the last element back to the first.
    pub fn cycle_if_added(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
    ) -> Result<Option<Vec<TaskId>>, GraphError> {
        if !self.would_create_cycle(task, depends_on)? {
            return Ok(None);
        }
        let from = self.require(task)?;
        let to = self.require(depends_on)?;

        // Shortest existing path from -> to, via BFS parents
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                break;
            }
            for next in self.neighbors(node, Direction::Outgoing) {
                if next != from && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![self.id_at(to).clone()];
        let mut cursor = to;
        while let Some(&prev) = parent.get(&cursor) {
            path.push(self.id_at(prev).clone());
            cursor = prev;
        }
        path.reverse();

        Ok(Some(path))
    }

    /// Returns the induced subgraph over `nodes`, keeping load order
    pub fn induced(&self, nodes: &HashSet<NodeIndex>) -> DependencyGraph {
        let graph = self.graph.filter_map(
            |idx, task| nodes.contains(&idx).then(|| task.clone()),
            |_, edge| Some(*edge),
        );
        let node_map: HashMap<TaskId, NodeIndex> = graph
            .node_indices()
            .map(|idx| (graph[idx].id.clone(), idx))
            .collect();

        let unresolved = self
            .unresolved
            .iter()
            .filter(|(id, _)| node_map.contains_key(*id))
            .map(|(id, missing)| (id.clone(), missing.clone()))
            .collect();

        DependencyGraph {
            graph,
            node_map,
            unresolved,
        }
    }

    /// The underlying petgraph graph, for petgraph algorithms
    pub(crate) fn petgraph(&self) -> &DiGraph<Task, ()> {
        &self.graph
    }

    /// Returns the node index for a task ID
    pub fn index_of(&self, task_id: &TaskId) -> Option<NodeIndex> {
        self.node_map.get(task_id).copied()
    }

    /// Returns the node index for a task ID, or `UnknownTask`
    pub fn require(&self, task_id: &TaskId) -> Result<NodeIndex, GraphError> {
        self.index_of(task_id).ok_or_else(|| GraphError::UnknownTask {
            id: task_id.clone(),
        })
    }

    /// Returns the task stored at a node
    ///
    /// # Panics
    ///
    /// Panics if the index does not belong to this graph.
    pub fn task_at(&self, idx: NodeIndex) -> &Task {
        &self.graph[idx]
    }

    /// Returns the ID of the task stored at a node
    pub fn id_at(&self, idx: NodeIndex) -> &TaskId {
        &self.graph[idx].id
    }

    /// Node indices in load order
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Direct prerequisites of a node, in load order
    pub fn prerequisite_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors(idx, Direction::Incoming)
    }

    /// Direct dependents of a node, in load order
    pub fn dependent_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors(idx, Direction::Outgoing)
    }

    pub(crate) fn neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort_unstable();
        neighbors
    }

    /// Number of direct prerequisites of a node
    pub fn in_degree(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors_directed(idx, Direction::Incoming).count()
    }

    /// Returns the direct prerequisites of a task
    pub fn prerequisites_of(&self, task_id: &TaskId) -> Vec<TaskId> {
        self.ids_of(task_id, Direction::Incoming)
    }

    /// Returns the direct dependents of a task (tasks that depend on it)
    pub fn dependents_of(&self, task_id: &TaskId) -> Vec<TaskId> {
        self.ids_of(task_id, Direction::Outgoing)
    }

    fn ids_of(&self, task_id: &TaskId, direction: Direction) -> Vec<TaskId> {
        match self.index_of(task_id) {
            Some(idx) => self
                .neighbors(idx, direction)
                .into_iter()
                .map(|n| self.id_at(n).clone())
                .collect(),
            None => vec![],
        }
    }

    /// All task IDs in load order
    pub fn all_task_ids(&self) -> Vec<TaskId> {
        self.graph.node_weights().map(|t| t.id.clone()).collect()
    }

    /// Returns a task by ID
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.index_of(task_id).map(|idx| &self.graph[idx])
    }

    /// All tasks in load order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_weights()
    }

    /// Returns tasks that are ready (not finished, every prerequisite completed)
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.node_indices()
            .filter(|&idx| {
                let task = self.task_at(idx);
                !task.status.is_terminal()
                    && !self.unresolved.contains_key(&task.id)
                    && self
                        .prerequisite_indices(idx)
                        .iter()
                        .all(|&p| self.task_at(p).status.is_complete())
            })
            .map(|idx| self.id_at(idx).clone())
            .collect()
    }

    /// Returns tasks that are blocked (not finished, some prerequisite
    /// incomplete or missing)
    pub fn blocked_tasks(&self) -> Vec<TaskId> {
        self.node_indices()
            .filter(|&idx| {
                let task = self.task_at(idx);
                !task.status.is_terminal()
                    && (self.unresolved.contains_key(&task.id)
                        || self
                            .prerequisite_indices(idx)
                            .iter()
                            .any(|&p| !self.task_at(p).status.is_complete()))
            })
            .map(|idx| self.id_at(idx).clone())
            .collect()
    }

    /// Prerequisites of `task_id` that referenced tasks missing from the graph
    pub fn missing_prerequisites(&self, task_id: &TaskId) -> &[TaskId] {
        self.unresolved
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.node_map.contains_key(task_id)
    }

    /// Returns the number of tasks in the graph
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}
