//! Analysis entry points
//!
//! An [`Analyzer`] owns one immutable snapshot graph. The graph is validated
//! once, on the first operation that needs a DAG, and the outcome is reused
//! by every later call.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::snapshot::Snapshot;
use crate::domain::{
    self, DependencyGraph, GraphError, OrphanPolicy, PriorityOrder, Ranking, Relatives, Task,
    TaskId, TaskOrder, TaskStatus, TieBreak, ValidationReport,
};
use crate::storage::TaskSource;

/// Tunables for analyses, loaded from the `[analysis]` config section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Depth used when a walk does not ask for one
    pub default_max_depth: usize,

    /// Largest depth a caller may ask for
    pub max_depth_limit: usize,

    /// Secondary ordering key after priority
    pub tie_break: TieBreak,

    /// Orphan detection policy
    pub orphans: OrphanPolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            default_max_depth: 100,
            max_depth_limit: 10_000,
            tie_break: TieBreak::default(),
            orphans: OrphanPolicy::default(),
        }
    }
}

/// Read-only analyses over one snapshot
pub struct Analyzer {
    graph: DependencyGraph,
    problems: Vec<GraphError>,
    order: Box<dyn TaskOrder + Send + Sync>,
    ranking: Ranking,
    options: AnalysisOptions,
    validity: OnceLock<Result<(), GraphError>>,
}

impl Analyzer {
    /// Creates an analyzer using the default priority ordering
    pub fn new(snapshot: Snapshot, options: AnalysisOptions) -> Self {
        let order = PriorityOrder::new(options.tie_break);
        Self::with_order(snapshot, options, order)
    }

    /// Creates an analyzer with a custom tie-break ordering
    pub fn with_order(
        snapshot: Snapshot,
        options: AnalysisOptions,
        order: impl TaskOrder + Send + Sync + 'static,
    ) -> Self {
        let (graph, problems) = DependencyGraph::build_lenient(snapshot.tasks, &snapshot.edges);
        let ranking = Ranking::new(&graph, &order);

        Self {
            graph,
            problems,
            order: Box::new(order),
            ranking,
            options,
            validity: OnceLock::new(),
        }
    }

    /// Loads a snapshot from a source and builds an analyzer over it
    pub fn load(source: &dyn TaskSource, options: AnalysisOptions) -> anyhow::Result<Self> {
        Ok(Self::new(Snapshot::load(source)?, options))
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Tasks in load order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.tasks()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.graph.task(id)
    }

    /// Fails with the first construction problem or a cycle witness.
    /// Computed once per analyzer.
    fn ensure_valid(&self) -> Result<(), GraphError> {
        self.validity
            .get_or_init(|| {
                let outcome = match self.problems.first() {
                    Some(problem) => Err(problem.clone()),
                    None => domain::check_acyclic(&self.graph, &self.ranking),
                };
                if let Err(err) = &outcome {
                    debug!(error = %err, "Snapshot failed validation");
                }
                outcome
            })
            .clone()
    }

    fn resolve_max_depth(&self, requested: Option<i64>) -> Result<usize, GraphError> {
        let Some(depth) = requested else {
            return Ok(self.options.default_max_depth);
        };

        let depth = usize::try_from(depth).map_err(|_| {
            GraphError::invalid(format!("max_depth must not be negative (got {})", depth))
        })?;
        if depth > self.options.max_depth_limit {
            return Err(GraphError::invalid(format!(
                "max_depth {} exceeds the limit of {}",
                depth, self.options.max_depth_limit
            )));
        }

        Ok(depth)
    }

    fn subgraph(&self, ids: &[TaskId]) -> Result<DependencyGraph, GraphError> {
        let nodes = ids
            .iter()
            .map(|id| self.graph.require(id))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(self.graph.induced(&nodes))
    }

    fn sort_by_rank(&self, mut ids: Vec<TaskId>) -> Vec<TaskId> {
        ids.sort_by_key(|id| self.graph.index_of(id).map(|idx| self.ranking.rank(idx)));
        ids
    }

    /// Execution order of all tasks, or of the subgraph induced by `ids`
    pub fn execution_order(&self, ids: Option<&[TaskId]>) -> Result<Vec<TaskId>, GraphError> {
        let subgraph = ids.map(|ids| self.subgraph(ids)).transpose()?;
        self.ensure_valid()?;

        match subgraph {
            None => domain::execution_order(&self.graph, &self.ranking),
            Some(graph) => {
                let ranking = Ranking::new(&graph, self.order.as_ref());
                domain::execution_order(&graph, &ranking)
            }
        }
    }

    /// Waves of tasks that can run in parallel
    pub fn execution_levels(&self) -> Result<Vec<Vec<TaskId>>, GraphError> {
        self.ensure_valid()?;
        domain::execution_levels(&self.graph, &self.ranking)
    }

    /// Transitive prerequisites of `id`
    pub fn ancestors(&self, id: &TaskId, max_depth: Option<i64>) -> Result<Relatives, GraphError> {
        let max_depth = self.resolve_max_depth(max_depth)?;
        self.ensure_valid()?;
        domain::ancestors(&self.graph, &self.ranking, id, max_depth)
    }

    /// Transitive dependents of `id`
    pub fn descendants(
        &self,
        id: &TaskId,
        max_depth: Option<i64>,
    ) -> Result<Relatives, GraphError> {
        let max_depth = self.resolve_max_depth(max_depth)?;
        self.ensure_valid()?;
        domain::descendants(&self.graph, &self.ranking, id, max_depth)
    }

    /// Orphans under the configured policy
    pub fn orphaned_tasks(&self) -> Result<Vec<TaskId>, GraphError> {
        self.orphaned_tasks_with(&self.options.orphans)
    }

    /// Orphans under an explicit policy
    pub fn orphaned_tasks_with(&self, policy: &OrphanPolicy) -> Result<Vec<TaskId>, GraphError> {
        self.ensure_valid()?;
        Ok(domain::orphaned_tasks(&self.graph, &self.ranking, policy))
    }

    /// Tasks nothing depends on
    pub fn leaf_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TaskId>, GraphError> {
        self.ensure_valid()?;
        Ok(domain::leaf_tasks(&self.graph, &self.ranking, status))
    }

    pub fn critical_path(
        &self,
        start: Option<&TaskId>,
        end: Option<&TaskId>,
    ) -> Result<domain::CriticalPath, GraphError> {
        self.ensure_valid()?;
        domain::critical_path(&self.graph, &self.ranking, start, end)
    }

    /// Dependency depth of every task
    pub fn dependency_depths(&self) -> Result<HashMap<TaskId, u32>, GraphError> {
        self.ensure_valid()?;
        domain::dependency_depths(&self.graph, &self.ranking)
    }

    /// Non-terminal tasks whose prerequisites are all completed
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.sort_by_rank(self.graph.ready_tasks())
    }

    /// Non-terminal tasks waiting on an incomplete prerequisite
    pub fn blocked_tasks(&self) -> Vec<TaskId> {
        self.sort_by_rank(self.graph.blocked_tasks())
    }

    /// Integrity check that reports findings instead of failing.
    /// With `ids`, only problems involving those tasks are reported.
    pub fn validate(&self, ids: Option<&[TaskId]>) -> ValidationReport {
        let Some(ids) = ids else {
            return domain::validate(&self.graph, &self.ranking, self.problems.clone());
        };

        let mut errors: Vec<GraphError> = ids
            .iter()
            .filter(|id| !self.graph.contains(id))
            .map(|id| GraphError::UnknownTask { id: id.clone() })
            .collect();

        let wanted: HashSet<&TaskId> = ids.iter().collect();
        errors.extend(
            self.problems
                .iter()
                .filter(|problem| match problem {
                    GraphError::BrokenReference { edge, .. } => wanted.contains(&edge.dependent),
                    GraphError::SelfDependency { id } => wanted.contains(id),
                    _ => true,
                })
                .cloned(),
        );

        let known: Vec<TaskId> = ids
            .iter()
            .filter(|id| self.graph.contains(id))
            .cloned()
            .collect();
        if let Ok(subgraph) = self.subgraph(&known) {
            let ranking = Ranking::new(&subgraph, self.order.as_ref());
            errors.extend(
                domain::cycles(&subgraph, &ranking)
                    .into_iter()
                    .map(|cycle| GraphError::CircularDependency { cycle }),
            );
        }

        ValidationReport::new(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyEdge, Priority, TaskOrigin};
    use chrono::{TimeZone, Utc};
    use std::cmp::Ordering;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn ids(names: &[&str]) -> Vec<TaskId> {
        names.iter().map(|n| id(n)).collect()
    }

    fn task(s: &str, duration: Option<u64>) -> Task {
        let mut task = Task::new(id(s), format!("Task {}", s));
        task.estimated_duration = duration;
        task.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        task
    }

    fn analyzer(tasks: Vec<Task>, edges: &[(&str, &str)]) -> Analyzer {
        let edges = edges
            .iter()
            .map(|(d, p)| DependencyEdge::new(id(d), id(p)))
            .collect();
        Analyzer::new(Snapshot::new(tasks, edges), AnalysisOptions::default())
    }

    fn chain() -> Analyzer {
        analyzer(
            vec![
                task("A", Some(10)),
                task("B", Some(20)),
                task("C", Some(30)),
                task("D", Some(5)),
            ],
            &[("B", "A"), ("C", "B"), ("D", "C")],
        )
    }

    #[test]
    fn chain_critical_path() {
        let result = chain().critical_path(None, None).unwrap();
        assert_eq!(result.path, ids(&["A", "B", "C", "D"]));
        assert_eq!(result.total_duration, 65);
    }

    #[test]
    fn diamond_prefers_longer_branch() {
        let a = analyzer(
            vec![
                task("A", None),
                task("B", Some(5)),
                task("C", Some(50)),
                task("D", None),
            ],
            &[("B", "A"), ("C", "A"), ("D", "B"), ("D", "C")],
        );

        let result = a.critical_path(None, None).unwrap();
        assert_eq!(result.path, ids(&["A", "C", "D"]));
        assert_eq!(result.total_duration, 50);
    }

    #[test]
    fn cycle_is_reported_and_blocks_analyses() {
        let a = analyzer(
            vec![task("A", None), task("B", None), task("C", None)],
            &[("B", "A"), ("C", "B"), ("A", "C")],
        );

        let report = a.validate(None);
        assert!(!report.valid);
        let GraphError::CircularDependency { cycle } = &report.errors[0] else {
            panic!("expected a cycle");
        };
        let mut sorted = cycle.clone();
        sorted.sort();
        assert_eq!(sorted, ids(&["A", "B", "C"]));

        assert!(matches!(
            a.execution_order(None),
            Err(GraphError::CircularDependency { .. })
        ));
        assert!(matches!(
            a.ancestors(&id("A"), None),
            Err(GraphError::CircularDependency { .. })
        ));
    }

    #[test]
    fn broken_reference_is_reported() {
        let a = analyzer(vec![task("X", None)], &[("X", "ghost")]);

        let report = a.validate(None);
        assert!(!report.valid);
        assert!(matches!(
            &report.errors[0],
            GraphError::BrokenReference { missing, .. } if *missing == id("ghost")
        ));
        assert!(matches!(
            a.critical_path(None, None),
            Err(GraphError::BrokenReference { .. })
        ));
    }

    #[test]
    fn empty_snapshot() {
        let a = analyzer(vec![], &[]);

        assert!(a.execution_order(None).unwrap().is_empty());
        let path = a.critical_path(None, None).unwrap();
        assert!(path.path.is_empty());
        assert_eq!(path.total_duration, 0);
        assert!(a.validate(None).valid);
    }

    #[test]
    fn subset_order_uses_induced_subgraph() {
        let a = chain();

        assert_eq!(
            a.execution_order(Some(&ids(&["D", "B"]))).unwrap(),
            ids(&["B", "D"])
        );
        assert_eq!(
            a.execution_order(Some(&ids(&["A", "ghost"]))).unwrap_err(),
            GraphError::UnknownTask { id: id("ghost") }
        );
    }

    #[test]
    fn max_depth_is_checked_first() {
        let a = chain();

        let negative = a.ancestors(&id("D"), Some(-1)).unwrap_err();
        assert_eq!(negative.kind(), "invalid_parameter");

        let too_deep = a.descendants(&id("A"), Some(1_000_000)).unwrap_err();
        assert_eq!(too_deep.kind(), "invalid_parameter");

        // Bad depth wins over an unknown seed
        let both = a.ancestors(&id("nope"), Some(-5)).unwrap_err();
        assert_eq!(both.kind(), "invalid_parameter");
    }

    #[test]
    fn default_depth_applies() {
        let a = chain();
        let result = a.ancestors(&id("D"), None).unwrap();

        assert_eq!(result.max_depth, 100);
        assert_eq!(result.ids(), ids(&["C", "B", "A"]));
    }

    #[test]
    fn validate_subset_reports_unknown_and_local_problems() {
        let a = analyzer(
            vec![task("A", None), task("B", None), task("X", None)],
            &[("B", "A"), ("A", "B"), ("X", "ghost")],
        );

        let report = a.validate(Some(&ids(&["X", "missing"])));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].kind(), "unknown_task");
        assert_eq!(report.errors[1].kind(), "broken_reference");

        let report = a.validate(Some(&ids(&["A"])));
        assert!(report.valid);

        let report = a.validate(Some(&ids(&["A", "B"])));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), "circular_dependency");
    }

    #[test]
    fn ready_and_blocked_follow_policy() {
        let mut a = task("A", None);
        a.complete();
        let mut urgent = task("urgent", None);
        urgent.priority = Priority::MAX;

        let an = analyzer(
            vec![a, task("B", None), urgent, task("C", None)],
            &[("C", "B")],
        );

        assert_eq!(an.ready_tasks(), ids(&["urgent", "B"]));
        assert_eq!(an.blocked_tasks(), ids(&["C"]));
    }

    #[test]
    fn orphans_use_configured_policy() {
        let mut human = task("human", None);
        human.origin = TaskOrigin::Human;
        let a = analyzer(vec![human, task("agent", None)], &[]);

        assert_eq!(a.orphaned_tasks().unwrap(), ids(&["agent"]));
        assert_eq!(
            a.orphaned_tasks_with(&OrphanPolicy {
                exclude_origins: vec![],
                ..OrphanPolicy::default()
            })
            .unwrap(),
            ids(&["agent", "human"])
        );
    }

    #[test]
    fn custom_order_is_injected() {
        let reverse_ids = |a: &Task, b: &Task| -> Ordering { b.id.cmp(&a.id) };
        let a = Analyzer::with_order(
            Snapshot::from_tasks(vec![task("a", None), task("b", None), task("c", None)]),
            AnalysisOptions::default(),
            reverse_ids,
        );

        assert_eq!(a.execution_order(None).unwrap(), ids(&["c", "b", "a"]));
        assert_eq!(
            a.execution_order(Some(&ids(&["a", "b"]))).unwrap(),
            ids(&["b", "a"])
        );
    }

    #[test]
    fn depths_and_levels() {
        let a = chain();

        let depths = a.dependency_depths().unwrap();
        assert_eq!(depths[&id("D")], 3);
        assert_eq!(a.execution_levels().unwrap().len(), 4);
    }

    #[test]
    fn options_parse_from_toml() {
        let options: AnalysisOptions = toml::from_str(
            r#"
default_max_depth = 5
tie_break = "id"

[orphans]
rule = "isolated"
"#,
        )
        .unwrap();

        assert_eq!(options.default_max_depth, 5);
        assert_eq!(options.max_depth_limit, 10_000);
        assert_eq!(options.tie_break, TieBreak::Id);
        assert_eq!(options.orphans.exclude_origins, vec![TaskOrigin::Human]);
    }
}
