//! # Storage Layer
//!
//! Persistence layer for dagplan with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Tasks | JSONL (one JSON per line) | `.dagplan/tasks.jsonl` |
//! | Config | TOML | `.dagplan/config.toml` |
//! | Mirror | SQLite (auto-regenerated) | `.dagplan/.cache/dagplan.db` |
//!
//! ## Concurrency Safety
//!
//! - [`TaskStore`] uses file locking (`fs2`) for concurrent access
//! - [`Cache`] uses mtime-based invalidation
//! - All rewrites are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a dagplan project
//! - [`TaskSource`] - Read interface consumed by the analysis layer
//! - [`TaskStore`] - Read/write tasks as JSONL
//! - [`Cache`] - SQLite mirror of the task store
//! - [`Config`] - Project and global configuration

mod cache;
mod config;
mod jsonl;
mod project;
mod source;

pub use cache::{Cache, CacheError};
pub use config::{Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig, StoreBackend};
pub use jsonl::TaskStore;
pub use project::{Project, ProjectError};
pub use source::TaskSource;
