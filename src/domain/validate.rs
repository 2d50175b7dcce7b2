//! Cycle validation
//!
//! Runs once per snapshot, before any scheduling or traversal. Later
//! algorithms assume an acyclic graph and keep visited sets only so they
//! always terminate.

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::debug;

use super::graph::{DependencyGraph, GraphError};
use super::id::TaskId;
use super::ordering::Ranking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Structured result of an integrity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<GraphError>,
}

impl ValidationReport {
    pub fn new(errors: Vec<GraphError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Finds one cycle, if any, as task ids in prerequisite -> dependent order.
/// The last id has an edge back to the first.
pub fn find_cycle(graph: &DependencyGraph, ranking: &Ranking) -> Option<Vec<TaskId>> {
    search(graph, ranking, ranking.nodes(), |_| true)
}

/// Fails with `CircularDependency` if the graph has a cycle
pub fn check_acyclic(graph: &DependencyGraph, ranking: &Ranking) -> Result<(), GraphError> {
    match find_cycle(graph, ranking) {
        Some(cycle) => {
            debug!(len = cycle.len(), "Dependency cycle found");
            Err(GraphError::CircularDependency { cycle })
        }
        None => Ok(()),
    }
}

/// One witness cycle per strongly connected component, ordered by the
/// best-ranked task of each component
pub fn cycles(graph: &DependencyGraph, ranking: &Ranking) -> Vec<Vec<TaskId>> {
    let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(graph.petgraph())
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|mut component| {
            ranking.sort(&mut component);
            component
        })
        .collect();
    components.sort_by_key(|component| ranking.rank(component[0]));

    let mut members = vec![false; graph.len()];
    let mut found = Vec::with_capacity(components.len());

    for component in &components {
        for &idx in component {
            members[idx.index()] = true;
        }
        if let Some(cycle) = search(graph, ranking, &component[..1], |idx| members[idx.index()]) {
            found.push(cycle);
        }
        for &idx in component {
            members[idx.index()] = false;
        }
    }

    found
}

/// Checks a leniently built graph and collects every finding
pub fn validate(
    graph: &DependencyGraph,
    ranking: &Ranking,
    construction_problems: Vec<GraphError>,
) -> ValidationReport {
    let mut errors = construction_problems;
    errors.extend(
        cycles(graph, ranking)
            .into_iter()
            .map(|cycle| GraphError::CircularDependency { cycle }),
    );

    debug!(errors = errors.len(), "Validated dependency graph");
    ValidationReport::new(errors)
}

/// Iterative three-colour DFS along dependent edges, starting from `roots`
/// in order and never leaving nodes accepted by `member`
fn search(
    graph: &DependencyGraph,
    ranking: &Ranking,
    roots: &[NodeIndex],
    member: impl Fn(NodeIndex) -> bool,
) -> Option<Vec<TaskId>> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let successors = |idx: NodeIndex| {
        let mut next: Vec<NodeIndex> = graph
            .dependent_indices(idx)
            .into_iter()
            .filter(|&n| member(n))
            .collect();
        ranking.sort(&mut next);
        next
    };

    for &root in roots {
        if marks[root.index()] != Mark::Unvisited {
            continue;
        }

        marks[root.index()] = Mark::InProgress;
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = vec![(root, successors(root), 0)];

        while let Some((node, next_nodes, cursor)) = stack.last_mut() {
            let Some(&next) = next_nodes.get(*cursor) else {
                marks[node.index()] = Mark::Done;
                stack.pop();
                continue;
            };
            *cursor += 1;

            match marks[next.index()] {
                Mark::Unvisited => {
                    marks[next.index()] = Mark::InProgress;
                    let children = successors(next);
                    stack.push((next, children, 0));
                }
                Mark::InProgress => {
                    let start = stack.iter().position(|(n, _, _)| *n == next)?;
                    return Some(
                        stack[start..]
                            .iter()
                            .map(|(n, _, _)| graph.id_at(*n).clone())
                            .collect(),
                    );
                }
                Mark::Done => {}
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyEdge, PriorityOrder, Task};

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn task(s: &str) -> Task {
        Task::new(id(s), format!("Task {}", s))
    }

    fn edge(dependent: &str, prerequisite: &str) -> DependencyEdge {
        DependencyEdge::new(id(dependent), id(prerequisite))
    }

    fn graph(tasks: &[&str], edges: &[(&str, &str)]) -> (DependencyGraph, Ranking) {
        let edges: Vec<_> = edges.iter().map(|(d, p)| edge(d, p)).collect();
        let graph = DependencyGraph::build(tasks.iter().map(|t| task(t)), &edges).unwrap();
        let ranking = Ranking::new(&graph, &PriorityOrder::default());
        (graph, ranking)
    }

    /// Walks the cycle edge by edge and checks it closes
    fn assert_closed(graph: &DependencyGraph, cycle: &[TaskId]) {
        assert!(cycle.len() >= 2);
        for (i, from) in cycle.iter().enumerate() {
            let to = &cycle[(i + 1) % cycle.len()];
            assert!(
                graph.dependents_of(from).contains(to),
                "{} -> {} is not an edge",
                from,
                to
            );
        }
    }

    #[test]
    fn acyclic_graph_passes() {
        let (g, r) = graph(&["A", "B", "C"], &[("B", "A"), ("C", "B"), ("C", "A")]);

        assert!(find_cycle(&g, &r).is_none());
        assert!(check_acyclic(&g, &r).is_ok());
        assert!(cycles(&g, &r).is_empty());
    }

    #[test]
    fn three_node_cycle_is_reported() {
        // A -> B -> C -> A
        let (g, r) = graph(&["A", "B", "C"], &[("B", "A"), ("C", "B"), ("A", "C")]);

        let err = check_acyclic(&g, &r).unwrap_err();
        let GraphError::CircularDependency { cycle } = err else {
            panic!("expected a circular dependency");
        };

        let mut sorted = cycle.clone();
        sorted.sort();
        assert_eq!(sorted, vec![id("A"), id("B"), id("C")]);
        assert_closed(&g, &cycle);
    }

    #[test]
    fn cycle_behind_acyclic_prefix() {
        let (g, r) = graph(
            &["root", "X", "Y"],
            &[("X", "root"), ("Y", "X"), ("X", "Y")],
        );

        let cycle = find_cycle(&g, &r).unwrap();
        assert_eq!(cycle.len(), 2);
        assert!(!cycle.contains(&id("root")));
        assert_closed(&g, &cycle);
    }

    #[test]
    fn independent_cycles_each_get_a_witness() {
        let (g, r) = graph(
            &["A", "B", "C", "D", "E"],
            &[("B", "A"), ("A", "B"), ("D", "C"), ("E", "D"), ("C", "E")],
        );

        let found = cycles(&g, &r);
        assert_eq!(found.len(), 2);
        for cycle in &found {
            assert_closed(&g, cycle);
        }
        assert!(found[0].contains(&id("A")));
        assert!(found[1].contains(&id("C")));
    }

    #[test]
    fn report_collects_construction_problems_and_cycles() {
        let tasks = [task("A"), task("B"), task("X")];
        let edges = [edge("A", "B"), edge("B", "A"), edge("X", "ghost")];
        let (g, problems) = DependencyGraph::build_lenient(tasks, &edges);
        let r = Ranking::new(&g, &PriorityOrder::default());

        let report = validate(&g, &r, problems);

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(
            &report.errors[0],
            GraphError::BrokenReference { missing, .. } if *missing == id("ghost")
        ));
        assert_eq!(report.errors[1].kind(), "circular_dependency");
    }

    #[test]
    fn valid_report_for_empty_graph() {
        let (g, r) = graph(&[], &[]);
        let report = validate(&g, &r, vec![]);

        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn long_chain_does_not_overflow_stack() {
        let names: Vec<String> = (0..50_000).map(|i| format!("n{}", i)).collect();
        let tasks: Vec<Task> = names.iter().map(|n| task(n)).collect();
        let edges: Vec<DependencyEdge> = names
            .windows(2)
            .map(|pair| edge(&pair[1], &pair[0]))
            .collect();
        let g = DependencyGraph::build(tasks, &edges).unwrap();
        let r = Ranking::new(&g, &PriorityOrder::default());

        assert!(check_acyclic(&g, &r).is_ok());
    }
}
