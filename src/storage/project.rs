//! Project management
//!
//! Handles project initialization and provides access to stores and
//! analyzers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use super::{Cache, Config, StoreBackend, TaskStore};
use crate::analysis::{Analyzer, SnapshotCache};
use crate::domain::{
    dependency_depths, DependencyEdge, DependencyGraph, PriorityOrder, Ranking, Task,
};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("Not in a dagplan project. Run 'dagplan init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# dagplan configuration

# Where analysis commands read tasks from: "jsonl" or "sqlite"
store = "jsonl"

[analysis]
# Depth used by ancestors/descendants when --max-depth is not given
default_max_depth = 100
# Largest --max-depth accepted
max_depth_limit = 10000
# Ordering among equal priorities: "created_at" or "id"
tie_break = "created_at"

[analysis.orphans]
# "no_prerequisites" or "isolated"
rule = "no_prerequisites"
# Origins never reported as orphans
exclude_origins = ["human"]
"#;

const GITIGNORE: &str = r#"# Ignore SQLite cache (regenerated from tasks.jsonl)
.cache/
"#;

/// A dagplan project
pub struct Project {
    root: PathBuf,
    config: Config,
    snapshots: SnapshotCache,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(".dagplan").is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;
        let snapshots = SnapshotCache::new(config.project.analysis.clone());

        Ok(Self {
            root,
            config,
            snapshots,
        })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let data_dir = root.join(".dagplan");

        fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create .dagplan directory: {}", data_dir.display())
        })?;

        let config_path = data_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = data_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Like [`Project::init`], but fails if the project already exists
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.join(".dagplan").is_dir() {
            return Err(ProjectError::AlreadyExists(root).into());
        }
        Self::init(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .dagplan directory path
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(".dagplan")
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the task store
    pub fn task_store(&self) -> TaskStore {
        TaskStore::for_project(&self.root)
    }

    /// Opens the SQLite cache for this project
    pub fn cache(&self) -> Result<Cache> {
        Cache::open(&self.root)
    }

    /// Rebuilds the cache from the task store
    pub fn rebuild_cache(&self) -> Result<Cache> {
        let mut cache = self.cache()?;
        let revision = cache.source_revision()?;
        let tasks = self.task_store().read_all()?;
        cache.rebuild(&tasks, &revision)?;
        Ok(cache)
    }

    /// Gets the cache if it's fresh, or rebuilds it if stale
    pub fn get_or_rebuild_cache(&self) -> Result<Cache> {
        let mut cache = self.cache()?;

        if cache.is_stale()? {
            debug!("Cache is stale, rebuilding");
            let revision = cache.source_revision()?;
            let tasks = self.task_store().read_all()?;
            cache.rebuild(&tasks, &revision)?;
        }

        Ok(cache)
    }

    /// Returns an analyzer over the chosen backend (the configured one by
    /// default), reusing the cached snapshot while the data is unchanged
    pub fn analyzer(&self, backend: Option<StoreBackend>) -> Result<Arc<Analyzer>> {
        match backend.unwrap_or(self.config.project.store) {
            StoreBackend::Jsonl => self.snapshots.get(&self.task_store()),
            StoreBackend::Sqlite => {
                let cache = self.get_or_rebuild_cache()?;
                self.snapshots.get(&cache)
            }
        }
    }

    /// Recomputes every task's dependency depth and rewrites the store if
    /// any changed. Returns the number of tasks updated. Edges to missing
    /// tasks are ignored; a graph with a cycle is left untouched.
    pub fn refresh_depths(&self) -> Result<usize> {
        let store = self.task_store();
        let mut tasks = store.read_all()?;

        let edges: Vec<DependencyEdge> = tasks.iter().flat_map(Task::edges).collect();
        let (graph, _) = DependencyGraph::build_lenient(tasks.iter().cloned(), &edges);
        let ranking = Ranking::new(
            &graph,
            &PriorityOrder::new(self.config.project.analysis.tie_break),
        );
        let depths = match dependency_depths(&graph, &ranking) {
            Ok(depths) => depths,
            Err(err) => {
                debug!(error = %err, "Skipping depth refresh");
                return Ok(0);
            }
        };

        let mut changed = 0;
        for task in &mut tasks {
            let depth = depths.get(&task.id).copied().unwrap_or(0);
            if task.depth != depth {
                task.depth = depth;
                changed += 1;
            }
        }

        if changed > 0 {
            store.write_all(&tasks)?;
            self.snapshots.invalidate();
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use tempfile::TempDir;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    #[test]
    fn init_creates_structure() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        assert!(project.data_dir().is_dir());
        assert!(project.data_dir().join("config.toml").is_file());
        assert!(project.data_dir().join(".gitignore").is_file());
    }

    #[test]
    fn default_config_file_parses_to_defaults() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        assert_eq!(
            project.config().project,
            crate::storage::ProjectConfig::default()
        );
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();

        Project::init(dir.path()).unwrap();
        Project::init(dir.path()).unwrap(); // Should not fail

        assert!(dir.path().join(".dagplan").is_dir());
        assert!(Project::create(dir.path()).is_err());
    }

    #[test]
    fn open_existing_project() {
        let dir = TempDir::new().unwrap();
        Project::init(dir.path()).unwrap();

        let project = Project::open(dir.path()).unwrap();
        assert_eq!(project.root(), dir.path());
    }

    #[test]
    fn open_non_project_fails() {
        let dir = TempDir::new().unwrap();
        let result = Project::open(dir.path());

        assert!(result.is_err());
    }

    #[test]
    fn analyzer_reads_either_backend() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        let a = Task::new(id("A"), "a");
        let mut b = Task::new(id("B"), "b");
        b.add_dependency(id("A"));
        project.task_store().write_all(&[a, b]).unwrap();

        let from_jsonl = project.analyzer(Some(StoreBackend::Jsonl)).unwrap();
        let from_sqlite = project.analyzer(Some(StoreBackend::Sqlite)).unwrap();

        assert_eq!(
            from_jsonl.execution_order(None).unwrap(),
            vec![id("A"), id("B")]
        );
        assert_eq!(
            from_sqlite.execution_order(None).unwrap(),
            vec![id("A"), id("B")]
        );
    }

    #[test]
    fn refresh_depths_updates_store() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        let a = Task::new(id("A"), "a");
        let mut b = Task::new(id("B"), "b");
        b.add_dependency(id("A"));
        let mut c = Task::new(id("C"), "c");
        c.add_dependency(id("B"));
        project.task_store().write_all(&[a, b, c]).unwrap();

        assert_eq!(project.refresh_depths().unwrap(), 2);
        assert_eq!(project.refresh_depths().unwrap(), 0);

        let tasks = project.task_store().read_all().unwrap();
        let depths: Vec<u32> = tasks.iter().map(|t| t.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[test]
    fn refresh_depths_ignores_broken_references() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        let a = Task::new(id("A"), "a");
        let mut b = Task::new(id("B"), "b");
        b.add_dependency(id("A"));
        let mut x = Task::new(id("X"), "x");
        x.add_dependency(id("ghost"));
        project.task_store().write_all(&[a, b, x]).unwrap();

        assert_eq!(project.refresh_depths().unwrap(), 1);

        let tasks = project.task_store().read_all().unwrap();
        let depths: Vec<(String, u32)> = tasks
            .iter()
            .map(|t| (t.id.to_string(), t.depth))
            .collect();
        assert_eq!(
            depths,
            vec![("A".into(), 0), ("B".into(), 1), ("X".into(), 0)]
        );
    }

    #[test]
    fn refresh_depths_skips_cycles() {
        let dir = TempDir::new().unwrap();
        let project = Project::init(dir.path()).unwrap();

        let mut a = Task::new(id("A"), "a");
        a.add_dependency(id("B"));
        let mut b = Task::new(id("B"), "b");
        b.add_dependency(id("A"));
        project.task_store().write_all(&[a, b]).unwrap();

        assert_eq!(project.refresh_depths().unwrap(), 0);
    }
}
