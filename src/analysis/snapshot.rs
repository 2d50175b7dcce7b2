//! Point-in-time copy of tasks and edges

use anyhow::Result;
use tracing::debug;

use crate::domain::{DependencyEdge, Task, TaskId};
use crate::storage::TaskSource;

/// Immutable tasks and edges for one analysis
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub edges: Vec<DependencyEdge>,
}

impl Snapshot {
    pub fn new(tasks: Vec<Task>, edges: Vec<DependencyEdge>) -> Self {
        Self { tasks, edges }
    }

    /// Builds a snapshot whose edges come from each task's `depends_on`
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let edges = tasks.iter().flat_map(Task::edges).collect();
        Self { tasks, edges }
    }

    /// Loads everything from a source
    pub fn load(source: &dyn TaskSource) -> Result<Self> {
        let tasks = source.load_tasks(None)?;
        let edges = source.load_edges(None)?;
        debug!(tasks = tasks.len(), edges = edges.len(), "Loaded snapshot");
        Ok(Self { tasks, edges })
    }
}

impl TaskSource for Snapshot {
    fn load_tasks(&self, ids: Option<&[TaskId]>) -> Result<Vec<Task>> {
        Ok(match ids {
            None => self.tasks.clone(),
            Some(ids) => self
                .tasks
                .iter()
                .filter(|t| ids.contains(&t.id))
                .cloned()
                .collect(),
        })
    }

    fn load_edges(&self, ids: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>> {
        Ok(match ids {
            None => self.edges.clone(),
            Some(ids) => self
                .edges
                .iter()
                .filter(|e| ids.contains(&e.dependent))
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    #[test]
    fn from_tasks_collects_edges() {
        let a = Task::new(id("A"), "a");
        let mut b = Task::new(id("B"), "b");
        b.add_dependency(id("A"));

        let snapshot = Snapshot::from_tasks(vec![a, b]);
        assert_eq!(snapshot.edges, vec![DependencyEdge::new(id("B"), id("A"))]);
    }

    #[test]
    fn snapshot_is_a_source() {
        let a = Task::new(id("A"), "a");
        let mut b = Task::new(id("B"), "b");
        b.add_dependency(id("A"));
        let snapshot = Snapshot::from_tasks(vec![a, b]);

        let reloaded = Snapshot::load(&snapshot).unwrap();
        assert_eq!(reloaded.tasks.len(), 2);
        assert_eq!(reloaded.edges.len(), 1);

        assert!(snapshot.load_edges(Some(&[id("A")])).unwrap().is_empty());
        assert_eq!(snapshot.load_tasks(Some(&[id("B")])).unwrap()[0].id, id("B"));
        assert_eq!(snapshot.revision().unwrap(), None);
    }
}
