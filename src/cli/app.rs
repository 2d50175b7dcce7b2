//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use super::output::{Output, OutputFormat};
use super::{cache_cmd, graph_cmd, logging, query, task};
use crate::domain::{OrphanRule, TaskStatus};
use crate::storage::{Config, Project, StoreBackend};

#[derive(Parser)]
#[command(name = "dagplan")]
#[command(author, version, about = "Dependency-aware task planning and scheduling")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Task source for analysis commands (defaults to the project config)
    #[arg(long, global = true)]
    pub store: Option<StoreArg>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Command-line spelling of [`StoreBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreArg {
    Jsonl,
    Sqlite,
}

impl From<StoreArg> for StoreBackend {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Jsonl => StoreBackend::Jsonl,
            StoreArg::Sqlite => StoreBackend::Sqlite,
        }
    }
}

/// Command-line spelling of [`OrphanRule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrphanRuleArg {
    /// No parent and no prerequisites
    NoPrerequisites,
    /// No parent and no edges at all
    Isolated,
}

impl From<OrphanRuleArg> for OrphanRule {
    fn from(arg: OrphanRuleArg) -> Self {
        match arg {
            OrphanRuleArg::NoPrerequisites => OrphanRule::NoPrerequisites,
            OrphanRuleArg::Isolated => OrphanRule::Isolated,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new dagplan project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage tasks
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Show tasks whose prerequisites are all completed
    Ready,

    /// Show tasks waiting on prerequisites
    Blocked,

    /// Show project status overview
    Status,

    /// Print a dependency-respecting execution order
    Order {
        /// Restrict to these tasks (induced subgraph)
        ids: Vec<String>,
    },

    /// Print parallel execution waves
    Levels,

    /// List transitive prerequisites of a task
    Ancestors {
        /// Task ID
        id: String,

        /// Maximum distance from the task
        #[arg(long, allow_negative_numbers = true)]
        max_depth: Option<i64>,
    },

    /// List transitive dependents of a task
    Descendants {
        /// Task ID
        id: String,

        /// Maximum distance from the task
        #[arg(long, allow_negative_numbers = true)]
        max_depth: Option<i64>,
    },

    /// List tasks with no parent and no prerequisites
    Orphans {
        /// Override the configured orphan rule
        #[arg(long)]
        rule: Option<OrphanRuleArg>,

        /// Also report tasks created by humans
        #[arg(long)]
        include_human: bool,
    },

    /// List tasks nothing depends on
    Leaves {
        /// Only leaves with this status
        #[arg(long)]
        status: Option<TaskStatus>,
    },

    /// Show the longest-duration dependency chain
    CriticalPath {
        /// Only consider tasks reachable from this task
        #[arg(long)]
        start: Option<String>,

        /// Only consider tasks that lead to this task
        #[arg(long)]
        end: Option<String>,
    },

    /// Check the graph for broken references and cycles
    Validate {
        /// Restrict to these tasks
        ids: Vec<String>,
    },

    /// Manage the SQLite cache
    #[command(subcommand)]
    Cache(cache_cmd::CacheCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose)?;

    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()
            .map(|global| global.default_format.into())
            .unwrap_or_default(),
    };
    let output = Output::new(format, cli.verbose);
    let store = cli.store.map(StoreBackend::from);

    output.verbose("dagplan starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing project at: {}", path));
            let project = Project::init(&path)?;
            output.verbose_ctx(
                "init",
                &format!("Created .dagplan directory at: {}", project.data_dir().display()),
            );
            output.success(&format!(
                "Initialized dagplan project at {}",
                project.root().display()
            ));
        }

        Commands::Task(cmd) => task::run(cmd, &output)?,

        Commands::Ready => query::ready(&output, store)?,
        Commands::Blocked => query::blocked(&output, store)?,
        Commands::Status => query::status(&output, store)?,

        Commands::Order { ids } => graph_cmd::order(&output, store, &ids)?,
        Commands::Levels => graph_cmd::levels(&output, store)?,
        Commands::Ancestors { id, max_depth } => {
            graph_cmd::ancestors(&output, store, &id, max_depth)?
        }
        Commands::Descendants { id, max_depth } => {
            graph_cmd::descendants(&output, store, &id, max_depth)?
        }
        Commands::Orphans {
            rule,
            include_human,
        } => graph_cmd::orphans(&output, store, rule.map(OrphanRule::from), include_human)?,
        Commands::Leaves { status } => graph_cmd::leaves(&output, store, status)?,
        Commands::CriticalPath { start, end } => {
            graph_cmd::critical_path(&output, store, start.as_deref(), end.as_deref())?
        }
        Commands::Validate { ids } => graph_cmd::validate(&output, store, &ids)?,

        Commands::Cache(cmd) => cache_cmd::run(cmd, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn negative_max_depth_reaches_the_handler() {
        let cli = Cli::try_parse_from(["dagplan", "ancestors", "A", "--max-depth", "-1"]).unwrap();
        match cli.command {
            Commands::Ancestors { max_depth, .. } => assert_eq!(max_depth, Some(-1)),
            _ => panic!("expected ancestors"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["dagplan", "order", "--store", "sqlite", "-f", "json"])
            .unwrap();
        assert_eq!(cli.store, Some(StoreArg::Sqlite));
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }
}
