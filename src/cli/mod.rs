//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project management | `init`, `status` |
//! | Task | Work item management | `task add`, `task dep`, `task done` |
//! | Query | Readiness | `ready`, `blocked` |
//! | Graph | Scheduling and reachability | `order`, `critical-path`, `validate` |
//! | Cache | SQLite mirror | `cache rebuild`, `cache status` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr, or set `RUST_LOG`:
//! ```bash
//! dagplan --verbose order
//! RUST_LOG=dagplan::domain=debug dagplan validate
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod cache_cmd;
mod graph_cmd;
mod logging;
mod output;
mod query;
mod task;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
