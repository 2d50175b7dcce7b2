//! JSONL storage for tasks
//!
//! Tasks are stored in `.dagplan/tasks.jsonl` with one JSON object per line.
//! Appends may leave several records for one task; the last record wins but
//! the first appearance fixes the load order. Uses file locking for
//! concurrent access safety.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::debug;

use super::source::{edges_among, select_tasks, TaskSource};
use crate::domain::{DependencyEdge, Task, TaskId};

/// Store for task data in JSONL format
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    /// Creates a new task store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".dagplan").join("tasks.jsonl"))
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all tasks from the store, in first-appearance order
    pub fn read_all(&self) -> Result<Vec<Task>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open task store: {}", self.path.display()))?;

        // Acquire shared lock for reading
        file.lock_shared()
            .context("Failed to acquire read lock on task store")?;

        let reader = BufReader::new(&file);
        let mut tasks: Vec<Task> = Vec::new();
        let mut positions: HashMap<TaskId, usize> = HashMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let task: Task = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse task at line {}", line_num + 1))?;

            match positions.get(&task.id) {
                Some(&pos) => tasks[pos] = task,
                None => {
                    positions.insert(task.id.clone(), tasks.len());
                    tasks.push(task);
                }
            }
        }

        // Lock is released when file is dropped
        Ok(tasks)
    }

    /// Returns a single task by ID
    pub fn get(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.read_all()?.into_iter().find(|t| &t.id == task_id))
    }

    /// Writes all tasks to the store (full rewrite, order preserved)
    pub fn write_all(&self, tasks: &[Task]) -> Result<()> {
        self.ensure_parent()?;

        // Write to temp file first
        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            // Acquire exclusive lock
            file.lock_exclusive()
                .context("Failed to acquire write lock on task store")?;

            let mut writer = BufWriter::new(&file);
            for task in tasks {
                let line = serde_json::to_string(task).context("Failed to serialize task")?;
                writeln!(writer, "{}", line).context("Failed to write task")?;
            }

            writer.flush().context("Failed to flush task store")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        debug!(count = tasks.len(), path = %self.path.display(), "Wrote task store");
        Ok(())
    }

    /// Appends a single task record
    pub fn append(&self, task: &Task) -> Result<()> {
        self.ensure_parent()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open task store: {}", self.path.display()))?;

        // Acquire exclusive lock
        file.lock_exclusive()
            .context("Failed to acquire write lock on task store")?;

        let mut writer = BufWriter::new(&file);
        let line = serde_json::to_string(task).context("Failed to serialize task")?;
        writeln!(writer, "{}", line).context("Failed to write task")?;

        writer.flush().context("Failed to flush task store")?;

        Ok(())
    }

    /// Replaces tasks in place (new ones go to the end) and rewrites the store
    pub fn update_many(&self, updated: &[Task]) -> Result<()> {
        let mut tasks = self.read_all()?;
        for task in updated {
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(slot) => *slot = task.clone(),
                None => tasks.push(task.clone()),
            }
        }
        self.write_all(&tasks)
    }

    /// Updates a single task (reads all, updates, writes all)
    pub fn update(&self, task: &Task) -> Result<()> {
        self.update_many(std::slice::from_ref(task))
    }

    /// Removes a task by ID
    pub fn remove(&self, task_id: &TaskId) -> Result<bool> {
        let mut tasks = self.read_all()?;
        let before = tasks.len();
        tasks.retain(|t| &t.id != task_id);
        let removed = tasks.len() != before;
        if removed {
            self.write_all(&tasks)?;
        }
        Ok(removed)
    }

    /// Compacts the store (removes superseded records, rewrites clean)
    pub fn compact(&self) -> Result<usize> {
        let tasks = self.read_all()?;
        let count = tasks.len();
        self.write_all(&tasks)?;
        Ok(count)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        Ok(())
    }
}

impl TaskSource for TaskStore {
    fn load_tasks(&self, ids: Option<&[TaskId]>) -> Result<Vec<Task>> {
        Ok(select_tasks(self.read_all()?, ids))
    }

    fn load_edges(&self, ids: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>> {
        Ok(edges_among(&self.read_all()?, ids))
    }

    /// Length and content digest of the store file
    fn revision(&self) -> Result<Option<String>> {
        file_revision(&self.path).map(Some)
    }
}

/// Length plus blake3 digest of a store file, or `"absent"`
pub(crate) fn file_revision(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok("absent".to_string());
    }

    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read task store: {}", path.display()))?;

    Ok(format!("{}:{}", bytes.len(), blake3::hash(&bytes).to_hex()))
}
