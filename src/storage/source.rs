//! The read interface the analysis layer consumes

use std::collections::HashSet;

use anyhow::Result;

use crate::domain::{DependencyEdge, Task, TaskId};

/// Read access to persisted tasks and their prerequisite edges
pub trait TaskSource {
    /// All tasks, or only those whose id is in `ids`, in load order
    fn load_tasks(&self, ids: Option<&[TaskId]>) -> Result<Vec<Task>>;

    /// All edges, or only the edges whose dependent is in `ids`
    fn load_edges(&self, ids: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>>;

    /// Changes whenever the stored data changes. `None` means unknown, so
    /// nothing may be cached.
    fn revision(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

pub(crate) fn select_tasks(tasks: Vec<Task>, ids: Option<&[TaskId]>) -> Vec<Task> {
    match ids {
        None => tasks,
        Some(ids) => {
            let wanted: HashSet<&TaskId> = ids.iter().collect();
            tasks.into_iter().filter(|t| wanted.contains(&t.id)).collect()
        }
    }
}

pub(crate) fn edges_among(tasks: &[Task], ids: Option<&[TaskId]>) -> Vec<DependencyEdge> {
    let wanted: Option<HashSet<&TaskId>> = ids.map(|ids| ids.iter().collect());
    tasks
        .iter()
        .filter(|t| wanted.as_ref().map_or(true, |w| w.contains(&t.id)))
        .flat_map(Task::edges)
        .collect()
}
