//! Task domain model
//!
//! Tasks are the units of work scheduled by the dependency graph.
//! Each task lists the prerequisites it depends on; those lists are the
//! persisted form of the graph's edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::TaskId;

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Blocked,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Pending,
        TaskStatus::Blocked,
        TaskStatus::Ready,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// Returns true if this status represents successful completion
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Returns true if the task will not run again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Returns true if this task is currently being worked on
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    /// Returns the snake_case name used in storage and output
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown task status: {}", s))
    }
}

/// Task priority, bounded to `0..=10`. Higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(0);
    pub const MAX: Priority = Priority(10);

    /// Creates a priority, returning `None` when out of range
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX.0).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(5)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::new(value).ok_or_else(|| {
            format!(
                "Priority {} is out of range ({}-{})",
                value,
                Self::MIN.0,
                Self::MAX.0
            )
        })
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

/// Who created a task
///
/// Used by the orphan policy: human-created roots are usually intentional
/// top-level work rather than forgotten leftovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    Human,
    #[default]
    Agent,
    System,
}

impl TaskOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOrigin::Human => "human",
            TaskOrigin::Agent => "agent",
            TaskOrigin::System => "system",
        }
    }
}

impl fmt::Display for TaskOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "human" => Ok(TaskOrigin::Human),
            "agent" => Ok(TaskOrigin::Agent),
            "system" => Ok(TaskOrigin::System),
            other => Err(format!("Unknown task origin: {}", other)),
        }
    }
}

/// A directed prerequisite edge: `dependent` cannot start before
/// `prerequisite` completes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: TaskId,
    pub prerequisite: TaskId,
}

impl DependencyEdge {
    pub fn new(dependent: TaskId, prerequisite: TaskId) -> Self {
        Self {
            dependent,
            prerequisite,
        }
    }

    /// Returns true if the edge points a task at itself
    pub fn is_self_edge(&self) -> bool {
        self.dependent == self.prerequisite
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} depends on {}", self.dependent, self.prerequisite)
    }
}

/// A unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Human-readable description
    pub description: String,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Scheduling priority (0-10, higher first)
    #[serde(default)]
    pub priority: Priority,

    /// Estimated duration in seconds (absent counts as zero)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u64>,

    /// Parent task for hierarchical grouping (not a dependency)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TaskId>,

    /// Longest distance from a root in the dependency graph
    #[serde(default)]
    pub depth: u32,

    /// Who created the task
    #[serde(default)]
    pub origin: TaskOrigin,

    /// Prerequisites of this task
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TaskId>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,

    /// When the task was completed (if completed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a new pending task with the given ID and description
    pub fn new(id: TaskId, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            description: description.into(),
            status: TaskStatus::Pending,
            priority: Priority::default(),
            estimated_duration: None,
            parent: None,
            depth: 0,
            origin: TaskOrigin::default(),
            depends_on: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Estimated duration in seconds, absent treated as zero
    pub fn duration(&self) -> u64 {
        self.estimated_duration.unwrap_or(0)
    }

    /// Returns the edges this task contributes to the graph
    pub fn edges(&self) -> impl Iterator<Item = DependencyEdge> + '_ {
        self.depends_on
            .iter()
            .map(|prereq| DependencyEdge::new(self.id.clone(), prereq.clone()))
    }

    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Marks the task as running
    pub fn start(&mut self) {
        self.set_status(TaskStatus::Running);
    }

    /// Marks the task as completed
    pub fn complete(&mut self) {
        self.set_status(TaskStatus::Completed);
        self.completed_at = Some(self.updated_at);
    }

    /// Marks the task as failed
    pub fn fail(&mut self) {
        self.set_status(TaskStatus::Failed);
    }

    /// Marks the task as cancelled
    pub fn cancel(&mut self) {
        self.set_status(TaskStatus::Cancelled);
    }

    /// Marks the task as blocked
    pub fn block(&mut self) {
        self.set_status(TaskStatus::Blocked);
    }

    /// Marks the task as ready to run
    pub fn mark_ready(&mut self) {
        self.set_status(TaskStatus::Ready);
    }

    /// Reopens a task (sets back to pending)
    pub fn reopen(&mut self) {
        self.set_status(TaskStatus::Pending);
        self.completed_at = None;
    }

    /// Adds a prerequisite; duplicates are ignored
    pub fn add_dependency(&mut self, task_id: TaskId) -> bool {
        if self.depends_on.contains(&task_id) {
            return false;
        }
        self.depends_on.push(task_id);
        self.updated_at = Utc::now();
        true
    }

    /// Removes a prerequisite
    pub fn remove_dependency(&mut self, task_id: &TaskId) -> bool {
        let before = self.depends_on.len();
        self.depends_on.retain(|d| d != task_id);
        let removed = self.depends_on.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// Sets the priority
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.updated_at = Utc::now();
    }

    /// Sets the estimated duration
    pub fn set_duration(&mut self, seconds: Option<u64>) {
        self.estimated_duration = seconds;
        self.updated_at = Utc::now();
    }

    /// Sets the description
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.updated_at = Utc::now();
    }
}
