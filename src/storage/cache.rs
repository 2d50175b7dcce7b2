//! SQLite mirror of the task store
//!
//! The cache sits in `.dagplan/.cache/dagplan.db` and mirrors
//! `tasks.jsonl`, with prerequisite edges in their own table. It can serve
//! as the task source for analyses (`--store sqlite`). Each rebuild records
//! the revision of `tasks.jsonl` it was built from; the mirror is stale as
//! soon as the file's current revision differs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use super::jsonl::file_revision;
use super::source::TaskSource;
use crate::domain::{DependencyEdge, Priority, Task, TaskId, TaskOrigin, TaskStatus};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Corrupt cache row for task {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Raw `tasks` row before conversion into a domain task
struct TaskRow {
    id: String,
    description: String,
    status: String,
    priority: i64,
    estimated_duration: Option<i64>,
    parent: Option<String>,
    depth: i64,
    origin: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TaskRow {
    fn into_task(self, depends_on: Vec<TaskId>) -> Result<Task> {
        let corrupt = |reason: String| CacheError::CorruptRow {
            id: self.id.clone(),
            reason,
        };

        let id: TaskId = self.id.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let status: TaskStatus = self.status.parse().map_err(corrupt)?;
        let origin: TaskOrigin = self.origin.parse().map_err(corrupt)?;
        let priority = u8::try_from(self.priority)
            .ok()
            .and_then(Priority::new)
            .ok_or_else(|| corrupt(format!("priority {} out of range", self.priority)))?;
        let parent = self
            .parent
            .as_deref()
            .map(str::parse::<TaskId>)
            .transpose()
            .map_err(|e| corrupt(format!("{}", e)))?;

        Ok(Task {
            id,
            description: self.description.clone(),
            status,
            priority,
            estimated_duration: self.estimated_duration.map(duration_from_sql),
            parent,
            depth: self.depth.max(0) as u32,
            origin,
            depends_on,
            created_at: parse_time(&self.created_at).map_err(corrupt)?,
            updated_at: parse_time(&self.updated_at).map_err(corrupt)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_time)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}

/// SQLite integers are signed 64-bit; durations are stored with their bits
/// reinterpreted so the full `u64` range survives the round trip. Do not
/// compare or sum `estimated_duration` in SQL.
fn duration_to_sql(seconds: u64) -> i64 {
    seconds as i64
}

fn duration_from_sql(stored: i64) -> u64 {
    stored as u64
}

fn parse_time(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", raw, e))
}

/// SQLite cache for task queries
pub struct Cache {
    /// Path to the SQLite database
    db_path: PathBuf,

    /// Path to the tasks.jsonl file the mirror is built from
    tasks_path: PathBuf,

    /// Database connection
    conn: Connection,
}

impl Cache {
    /// Schema version - bump when schema changes to force rebuild
    const SCHEMA_VERSION: i32 = 1;

    /// Creates or opens the cache for a project
    pub fn open(project_root: &Path) -> Result<Self> {
        let data_dir = project_root.join(".dagplan");
        let cache_dir = data_dir.join(".cache");
        let db_path = cache_dir.join("dagplan.db");
        let tasks_path = data_dir.join("tasks.jsonl");

        // Ensure cache directory exists
        fs::create_dir_all(&cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open cache database: {}", db_path.display()))?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut cache = Self {
            db_path,
            tasks_path,
            conn,
        };

        cache.ensure_schema()?;

        Ok(cache)
    }

    /// Ensures the schema is up to date
    fn ensure_schema(&mut self) -> Result<()> {
        let current_version = self.get_schema_version()?;

        if current_version != Self::SCHEMA_VERSION {
            debug!(
                from = current_version,
                to = Self::SCHEMA_VERSION,
                "Recreating cache schema"
            );
            self.create_schema()?;
        }

        Ok(())
    }

    /// Gets the current schema version
    fn get_schema_version(&self) -> Result<i32> {
        let result: Option<i32> = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .optional()?;

        Ok(result.unwrap_or(0))
    }

    /// Creates the schema from scratch
    fn create_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "
            DROP TABLE IF EXISTS dependencies;
            DROP TABLE IF EXISTS tasks;
            DROP TABLE IF EXISTS cache_meta;

            CREATE TABLE tasks (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                estimated_duration INTEGER,
                parent TEXT,
                depth INTEGER NOT NULL,
                origin TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE dependencies (
                task_id TEXT NOT NULL,
                depends_on_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (task_id, depends_on_id)
            );

            CREATE TABLE cache_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX idx_tasks_status ON tasks(status);
            CREATE INDEX idx_deps_prerequisite ON dependencies(depends_on_id);
            ",
        )?;

        // Set schema version
        self.conn.execute_batch(&format!(
            "PRAGMA user_version = {}",
            Self::SCHEMA_VERSION
        ))?;

        Ok(())
    }

    /// Checks if the cache needs to be rebuilt
    pub fn is_stale(&self) -> Result<bool> {
        let Some(built_from) = self.built_from()? else {
            return Ok(true);
        };

        Ok(built_from != self.source_revision()?)
    }

    /// Current revision of the backing `tasks.jsonl`
    pub fn source_revision(&self) -> Result<String> {
        file_revision(&self.tasks_path)
    }

    /// Revision of `tasks.jsonl` the cached rows were built from
    fn built_from(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = 'source_revision'",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Rebuilds the cache from the given tasks, keeping their order.
    /// `source_revision` must be read before the tasks were loaded.
    pub fn rebuild(&mut self, tasks: &[Task], source_revision: &str) -> Result<()> {
        let tx = self.conn.transaction()?;

        // Clear existing data
        tx.execute("DELETE FROM dependencies", [])?;
        tx.execute("DELETE FROM tasks", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO tasks (seq, id, description, status, priority,
                     estimated_duration, parent, depth, origin, created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;

            for (seq, task) in tasks.iter().enumerate() {
                stmt.execute(params![
                    seq as i64,
                    task.id.as_str(),
                    task.description,
                    task.status.as_str(),
                    task.priority.value() as i64,
                    task.estimated_duration.map(duration_to_sql),
                    task.parent.as_ref().map(TaskId::as_str),
                    task.depth as i64,
                    task.origin.as_str(),
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                    task.completed_at.map(|t| t.to_rfc3339()),
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO dependencies (task_id, depends_on_id, position)
                 VALUES (?1, ?2, ?3)",
            )?;

            for task in tasks {
                for (position, dep_id) in task.depends_on.iter().enumerate() {
                    stmt.execute(params![task.id.as_str(), dep_id.as_str(), position as i64])?;
                }
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO cache_meta (key, value) VALUES ('source_revision', ?1)",
            params![source_revision],
        )?;

        tx.commit()?;

        debug!(tasks = tasks.len(), path = %self.db_path.display(), "Rebuilt cache");
        Ok(())
    }

    /// Removes every cached row and the rebuild stamp
    pub fn clear(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM dependencies; DELETE FROM tasks; DELETE FROM cache_meta;",
        )?;
        Ok(())
    }

    /// Query: Get task counts by status
    pub fn task_counts(&self) -> Result<HashMap<TaskStatus, usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            let status: TaskStatus = status.parse().map_err(|e: String| anyhow!(e))?;
            counts.insert(status, count as usize);
        }

        Ok(counts)
    }

    /// Query: number of cached edges
    pub fn edge_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn all_edges(&self) -> Result<Vec<DependencyEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.task_id, d.depends_on_id FROM dependencies d
             JOIN tasks t ON t.id = d.task_id
             ORDER BY t.seq, d.position",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(dependent, prerequisite)| -> Result<DependencyEdge> {
                Ok(DependencyEdge::new(dependent.parse()?, prerequisite.parse()?))
            })
            .collect()
    }

    fn all_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, description, status, priority, estimated_duration, parent, depth,
                    origin, created_at, updated_at, completed_at
             FROM tasks ORDER BY seq",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(TaskRow {
                    id: row.get(0)?,
                    description: row.get(1)?,
                    status: row.get(2)?,
                    priority: row.get(3)?,
                    estimated_duration: row.get(4)?,
                    parent: row.get(5)?,
                    depth: row.get(6)?,
                    origin: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                    completed_at: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut prerequisites: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for edge in self.all_edges()? {
            prerequisites
                .entry(edge.dependent)
                .or_default()
                .push(edge.prerequisite);
        }

        rows.into_iter()
            .map(|row| {
                let depends_on = row
                    .id
                    .parse::<TaskId>()
                    .ok()
                    .and_then(|id| prerequisites.remove(&id))
                    .unwrap_or_default();
                row.into_task(depends_on)
            })
            .collect()
    }

    /// Returns the path to the cache database
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl TaskSource for Cache {
    fn load_tasks(&self, ids: Option<&[TaskId]>) -> Result<Vec<Task>> {
        Ok(super::source::select_tasks(self.all_tasks()?, ids))
    }

    fn load_edges(&self, ids: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>> {
        let edges = self.all_edges()?;
        Ok(match ids {
            None => edges,
            Some(ids) => edges
                .into_iter()
                .filter(|e| ids.contains(&e.dependent))
                .collect(),
        })
    }

    /// The `tasks.jsonl` revision the rows were built from
    fn revision(&self) -> Result<Option<String>> {
        self.built_from()
    }
}
