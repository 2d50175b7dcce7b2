//! Task CLI commands
//!
//! Commands that change dependencies recompute stored depths afterwards.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;

use super::graph_cmd::parse_id;
use super::output::Output;
use crate::domain::{
    DependencyEdge, DependencyGraph, GraphError, Priority, Task, TaskId, TaskOrigin, TaskStatus,
};
use crate::storage::{Project, TaskStore};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task
    ///
    /// Examples:
    ///   dagplan task add "Write parser"
    ///   dagplan task add "Ship" --id ship --after build --after test
    Add {
        /// What the task is about
        description: String,

        /// Explicit ID (generated from the description otherwise)
        #[arg(long)]
        id: Option<String>,

        /// Priority 0-10, higher runs first
        #[arg(long, short)]
        priority: Option<u8>,

        /// Estimated duration in seconds
        #[arg(long, short)]
        duration: Option<u64>,

        /// Parent task for grouping
        #[arg(long)]
        parent: Option<String>,

        /// Who created the task (human, agent, system)
        #[arg(long)]
        origin: Option<TaskOrigin>,

        /// Prerequisite task (repeatable)
        #[arg(long = "after", value_name = "ID")]
        after: Vec<String>,
    },

    /// List tasks in store order
    List {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<TaskStatus>,
    },

    /// Show task details
    Show {
        /// Task ID
        id: String,
    },

    /// Mark task as running
    Start {
        /// Task ID
        id: String,
    },

    /// Mark task as completed
    Done {
        /// Task ID
        id: String,
    },

    /// Mark task as failed
    Fail {
        /// Task ID
        id: String,
    },

    /// Mark task as cancelled
    Cancel {
        /// Task ID
        id: String,
    },

    /// Mark task as blocked
    Block {
        /// Task ID
        id: String,
    },

    /// Put a finished task back to pending
    Reopen {
        /// Task ID
        id: String,
    },

    /// Change task fields
    Set {
        /// Task ID
        id: String,

        /// New priority 0-10
        #[arg(long, short)]
        priority: Option<u8>,

        /// New estimated duration in seconds
        #[arg(long, short)]
        duration: Option<u64>,

        /// New description
        #[arg(long)]
        description: Option<String>,
    },

    /// Add a dependency between tasks
    Dep {
        /// Task that will wait
        task: String,

        /// Task that must be completed first
        depends_on: String,
    },

    /// Remove a dependency
    Undep {
        /// Task to unblock
        task: String,

        /// Dependency to remove
        depends_on: String,
    },
}

pub fn run(cmd: TaskCommands, output: &Output) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            description,
            id,
            priority,
            duration,
            parent,
            origin,
            after,
        } => add_task(
            output,
            NewTask {
                description,
                id,
                priority,
                duration,
                parent,
                origin,
                after,
            },
        ),
        TaskCommands::List { status } => list_tasks(output, status),
        TaskCommands::Show { id } => show_task(output, &id),
        TaskCommands::Start { id } => transition(output, &id, "Started", Task::start),
        TaskCommands::Done { id } => transition(output, &id, "Completed", Task::complete),
        TaskCommands::Fail { id } => transition(output, &id, "Failed", Task::fail),
        TaskCommands::Cancel { id } => transition(output, &id, "Cancelled", Task::cancel),
        TaskCommands::Block { id } => transition(output, &id, "Blocked", Task::block),
        TaskCommands::Reopen { id } => transition(output, &id, "Reopened", Task::reopen),
        TaskCommands::Set {
            id,
            priority,
            duration,
            description,
        } => set_fields(output, &id, priority, duration, description),
        TaskCommands::Dep { task, depends_on } => add_dependency(output, &task, &depends_on),
        TaskCommands::Undep { task, depends_on } => remove_dependency(output, &task, &depends_on),
    }
}

struct NewTask {
    description: String,
    id: Option<String>,
    priority: Option<u8>,
    duration: Option<u64>,
    parent: Option<String>,
    origin: Option<TaskOrigin>,
    after: Vec<String>,
}

fn parse_priority(value: u8) -> Result<Priority, GraphError> {
    Priority::new(value).ok_or_else(|| {
        GraphError::invalid(format!(
            "priority must be between {} and {}, got {}",
            Priority::MIN,
            Priority::MAX,
            value
        ))
    })
}

fn find<'a>(tasks: &'a mut [Task], id: &TaskId) -> Result<&'a mut Task> {
    tasks
        .iter_mut()
        .find(|t| &t.id == id)
        .ok_or_else(|| GraphError::UnknownTask { id: id.clone() }.into())
}

/// Recomputes stored depths after an edge change
fn refresh_depths(project: &Project, output: &Output) -> Result<()> {
    let changed = project.refresh_depths()?;
    output.verbose(&format!("Refreshed depth of {} tasks", changed));
    Ok(())
}

fn add_task(output: &Output, new: NewTask) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let tasks = store.read_all()?;
    let exists = |id: &TaskId| tasks.iter().any(|t| &t.id == id);

    let now = Utc::now();
    let id = match &new.id {
        Some(raw) => parse_id(raw)?,
        None => TaskId::generate(&new.description, now),
    };
    if exists(&id) {
        anyhow::bail!("Task already exists: {}", id);
    }

    let mut task = Task::new(id, new.description);
    if let Some(priority) = new.priority {
        task.set_priority(parse_priority(priority)?);
    }
    task.set_duration(new.duration);
    if let Some(origin) = new.origin {
        task.origin = origin;
    }
    if let Some(raw) = &new.parent {
        let parent = parse_id(raw)?;
        if !exists(&parent) {
            anyhow::bail!("Parent task not found: {}", parent);
        }
        task.parent = Some(parent);
    }
    for raw in &new.after {
        let prerequisite = parse_id(raw)?;
        if prerequisite == task.id {
            return Err(GraphError::SelfDependency { id: prerequisite }.into());
        }
        if !exists(&prerequisite) {
            return Err(GraphError::BrokenReference {
                edge: DependencyEdge::new(task.id.clone(), prerequisite.clone()),
                missing: prerequisite,
            }
            .into());
        }
        task.add_dependency(prerequisite);
    }

    // Nothing depends on a new task, so only its own depth needs computing
    task.depth = tasks
        .iter()
        .filter(|t| task.depends_on.contains(&t.id))
        .map(|t| t.depth.saturating_add(1))
        .max()
        .unwrap_or(0);

    store.append(&task)?;

    if output.is_json() {
        output.data(&task);
    } else {
        output.success(&format!("Created task: {} - {}", task.id, task.description));
    }

    Ok(())
}

fn list_tasks(output: &Output, status: Option<TaskStatus>) -> Result<()> {
    let project = Project::open_current()?;
    let tasks: Vec<Task> = project
        .task_store()
        .read_all()?
        .into_iter()
        .filter(|t| status.map_or(true, |s| t.status == s))
        .collect();

    if output.is_json() {
        output.data(&tasks);
    } else if tasks.is_empty() {
        match status {
            Some(status) => println!("No {} tasks", status),
            None => println!("No tasks"),
        }
    } else {
        println!(
            "{:<20} {:<10} {:<4} {:<6} DESCRIPTION",
            "ID", "STATUS", "PRI", "DEPTH"
        );
        println!("{}", "-".repeat(70));
        for task in &tasks {
            println!(
                "{:<20} {:<10} {:<4} {:<6} {}",
                task.id, task.status, task.priority, task.depth, task.description
            );
        }
    }

    Ok(())
}

fn show_task(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id = parse_id(id_str)?;
    let tasks = project.task_store().read_all()?;

    let task = tasks
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| GraphError::UnknownTask { id: id.clone() })?;

    let status_of = |dep: &TaskId| tasks.iter().find(|t| &t.id == dep).map(|t| t.status);
    let is_ready = !task.status.is_terminal()
        && task
            .depends_on
            .iter()
            .all(|dep| status_of(dep).is_some_and(|s| s.is_complete()));
    let dependents: Vec<&TaskId> = tasks
        .iter()
        .filter(|t| t.depends_on.contains(&task.id))
        .map(|t| &t.id)
        .collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task,
            "dependents": dependents,
            "is_ready": is_ready,
        }));
    } else {
        println!("Task: {}", task.id);
        println!("Description: {}", task.description);
        println!("Status: {}", task.status);
        println!("Priority: {}", task.priority);
        if let Some(duration) = task.estimated_duration {
            println!("Estimated duration: {}s", duration);
        }
        println!("Depth: {}", task.depth);
        println!("Origin: {}", task.origin);
        if let Some(parent) = &task.parent {
            println!("Parent: {}", parent);
        }
        println!("Created: {}", task.created_at.format("%Y-%m-%d %H:%M"));
        println!("Updated: {}", task.updated_at.format("%Y-%m-%d %H:%M"));
        if let Some(completed) = task.completed_at {
            println!("Completed: {}", completed.format("%Y-%m-%d %H:%M"));
        }

        if !task.depends_on.is_empty() {
            println!("\nDepends on:");
            for dep in &task.depends_on {
                let dep_status = status_of(dep)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "missing".to_string());
                println!("  {} ({})", dep, dep_status);
            }
        }

        if !dependents.is_empty() {
            println!("\nRequired by:");
            for dependent in &dependents {
                println!("  {}", dependent);
            }
        }

        if is_ready {
            println!("\nREADY (all prerequisites complete)");
        }
    }

    Ok(())
}

fn transition(
    output: &Output,
    id_str: &str,
    verb: &str,
    apply: impl FnOnce(&mut Task),
) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let id = parse_id(id_str)?;

    let mut tasks = store.read_all()?;
    let task = find(&mut tasks, &id)?;
    apply(&mut *task);
    store.update(task)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": task.id,
            "status": task.status,
            "completed_at": task.completed_at,
        }));
    } else {
        output.success(&format!("{} task: {}", verb, task.id));
    }

    Ok(())
}

fn set_fields(
    output: &Output,
    id_str: &str,
    priority: Option<u8>,
    duration: Option<u64>,
    description: Option<String>,
) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let id = parse_id(id_str)?;
    let priority = priority.map(parse_priority).transpose()?;

    let mut tasks = store.read_all()?;
    let task = find(&mut tasks, &id)?;

    if let Some(priority) = priority {
        task.set_priority(priority);
    }
    if duration.is_some() {
        task.set_duration(duration);
    }
    if let Some(description) = description {
        task.set_description(description);
    }
    store.update(task)?;

    if output.is_json() {
        output.data(&*task);
    } else {
        output.success(&format!("Updated task: {}", task.id));
    }

    Ok(())
}

fn load_pair(
    store: &TaskStore,
    task_str: &str,
    depends_on_str: &str,
) -> Result<(Vec<Task>, TaskId, TaskId)> {
    let task_id = parse_id(task_str)?;
    let depends_on_id = parse_id(depends_on_str)?;
    Ok((store.read_all()?, task_id, depends_on_id))
}

fn add_dependency(output: &Output, task_str: &str, depends_on_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let (mut tasks, task_id, depends_on_id) = load_pair(&store, task_str, depends_on_str)?;

    // Existing broken references must not block unrelated edits
    let edges: Vec<DependencyEdge> = tasks.iter().flat_map(Task::edges).collect();
    let (graph, _) = DependencyGraph::build_lenient(tasks.iter().cloned(), &edges);

    if let Some(cycle) = graph.cycle_if_added(&task_id, &depends_on_id)? {
        return Err(GraphError::CircularDependency { cycle }.into());
    }

    let task = find(&mut tasks, &task_id)?;
    if task.add_dependency(depends_on_id.clone()) {
        store.update(task)?;
        refresh_depths(&project, output)?;
    } else {
        output.verbose(&format!("{} already depends on {}", task_id, depends_on_id));
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task_id,
            "depends_on": depends_on_id,
        }));
    } else {
        output.success(&format!("{} now depends on {}", task_id, depends_on_id));
    }

    Ok(())
}

fn remove_dependency(output: &Output, task_str: &str, depends_on_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let (mut tasks, task_id, depends_on_id) = load_pair(&store, task_str, depends_on_str)?;

    let task = find(&mut tasks, &task_id)?;
    if !task.remove_dependency(&depends_on_id) {
        anyhow::bail!("{} does not depend on {}", task_id, depends_on_id);
    }
    store.update(task)?;
    refresh_depths(&project, output)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task_id,
            "removed_dependency": depends_on_id,
        }));
    } else {
        output.success(&format!(
            "Removed dependency: {} no longer depends on {}",
            task_id, depends_on_id
        ));
    }

    Ok(())
}
