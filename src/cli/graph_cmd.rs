//! Graph analysis commands (order, levels, ancestors, descendants, orphans,
//! leaves, critical-path, validate)

use std::sync::Arc;

use anyhow::Result;

use super::output::Output;
use crate::analysis::Analyzer;
use crate::domain::{GraphError, OrphanRule, Relatives, TaskId, TaskOrigin, TaskStatus};
use crate::storage::{Project, StoreBackend};

/// Opens the current project and its analyzer for the chosen backend
pub(super) fn open_analyzer(
    output: &Output,
    context: &str,
    store: Option<StoreBackend>,
) -> Result<Arc<Analyzer>> {
    let project = Project::open_current()?;
    output.verbose_ctx(
        context,
        &format!("Opened project at: {}", project.root().display()),
    );

    let analyzer = project.analyzer(store)?;
    output.verbose_ctx(
        context,
        &format!(
            "Loaded {} tasks, {} dependencies",
            analyzer.graph().len(),
            analyzer.graph().edge_count()
        ),
    );
    Ok(analyzer)
}

pub(super) fn parse_id(raw: &str) -> Result<TaskId, GraphError> {
    raw.parse().map_err(GraphError::from)
}

fn parse_ids(raw: &[String]) -> Result<Vec<TaskId>, GraphError> {
    raw.iter().map(|s| parse_id(s)).collect()
}

fn description<'a>(analyzer: &'a Analyzer, id: &TaskId) -> &'a str {
    analyzer
        .task(id)
        .map(|t| t.description.as_str())
        .unwrap_or("")
}

fn print_id_list(analyzer: &Analyzer, ids: &[TaskId]) {
    println!("{:<20} DESCRIPTION", "ID");
    println!("{}", "-".repeat(60));
    for id in ids {
        println!("{:<20} {}", id, description(analyzer, id));
    }
}

/// Print a dependency-respecting execution order
pub fn order(output: &Output, store: Option<StoreBackend>, ids: &[String]) -> Result<()> {
    let subset = parse_ids(ids)?;
    let analyzer = open_analyzer(output, "order", store)?;

    let order = if subset.is_empty() {
        analyzer.execution_order(None)?
    } else {
        output.verbose_ctx("order", &format!("Scheduling subset of {} tasks", subset.len()));
        analyzer.execution_order(Some(&subset))?
    };

    if output.is_json() {
        output.data(&serde_json::json!({ "order": order }));
    } else if order.is_empty() {
        println!("No tasks.");
    } else {
        println!("Execution order ({}):", order.len());
        for (position, id) in order.iter().enumerate() {
            println!("{:>4}. {:<20} {}", position + 1, id, description(&analyzer, id));
        }
    }

    Ok(())
}

/// Print parallel execution waves
pub fn levels(output: &Output, store: Option<StoreBackend>) -> Result<()> {
    let analyzer = open_analyzer(output, "levels", store)?;
    let levels = analyzer.execution_levels()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "levels": levels }));
    } else if levels.is_empty() {
        println!("No tasks.");
    } else {
        for (depth, wave) in levels.iter().enumerate() {
            let ids: Vec<&str> = wave.iter().map(TaskId::as_str).collect();
            println!("Level {}: {}", depth, ids.join(", "));
        }
    }

    Ok(())
}

/// List transitive prerequisites of a task
pub fn ancestors(
    output: &Output,
    store: Option<StoreBackend>,
    id: &str,
    max_depth: Option<i64>,
) -> Result<()> {
    let seed = parse_id(id)?;
    let analyzer = open_analyzer(output, "ancestors", store)?;
    let relatives = analyzer.ancestors(&seed, max_depth)?;

    print_relatives(output, &analyzer, "Ancestors", &relatives);
    Ok(())
}

/// List transitive dependents of a task
pub fn descendants(
    output: &Output,
    store: Option<StoreBackend>,
    id: &str,
    max_depth: Option<i64>,
) -> Result<()> {
    let seed = parse_id(id)?;
    let analyzer = open_analyzer(output, "descendants", store)?;
    let relatives = analyzer.descendants(&seed, max_depth)?;

    print_relatives(output, &analyzer, "Descendants", &relatives);
    Ok(())
}

fn print_relatives(output: &Output, analyzer: &Analyzer, label: &str, relatives: &Relatives) {
    if output.is_json() {
        output.data(relatives);
        return;
    }

    if relatives.is_empty() {
        println!("No {} of {}.", label.to_lowercase(), relatives.seed);
    } else {
        println!(
            "{} of {} (max depth {}):",
            label, relatives.seed, relatives.max_depth
        );
        println!("{:<6} {:<20} DESCRIPTION", "DEPTH", "ID");
        println!("{}", "-".repeat(60));
        for relative in &relatives.tasks {
            println!(
                "{:<6} {:<20} {}",
                relative.depth,
                relative.id,
                description(analyzer, &relative.id)
            );
        }
    }

    if relatives.beyond_limit > 0 {
        println!(
            "({} more beyond depth {})",
            relatives.beyond_limit, relatives.max_depth
        );
    }
}

/// List orphaned tasks under the configured policy, with optional overrides
pub fn orphans(
    output: &Output,
    store: Option<StoreBackend>,
    rule: Option<OrphanRule>,
    include_human: bool,
) -> Result<()> {
    let analyzer = open_analyzer(output, "orphans", store)?;

    let mut policy = analyzer.options().orphans.clone();
    if let Some(rule) = rule {
        policy.rule = rule;
    }
    if include_human {
        policy.exclude_origins.retain(|o| *o != TaskOrigin::Human);
    }
    output.verbose_ctx("orphans", &format!("Using policy: {:?}", policy));

    let orphans = analyzer.orphaned_tasks_with(&policy)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "orphans": orphans }));
    } else if orphans.is_empty() {
        println!("No orphaned tasks.");
    } else {
        println!("Orphaned tasks ({}):", orphans.len());
        print_id_list(&analyzer, &orphans);
    }

    Ok(())
}

/// List tasks nothing depends on
pub fn leaves(output: &Output, store: Option<StoreBackend>, status: Option<TaskStatus>) -> Result<()> {
    let analyzer = open_analyzer(output, "leaves", store)?;
    let leaves = analyzer.leaf_tasks(status)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "leaves": leaves }));
    } else if leaves.is_empty() {
        println!("No leaf tasks.");
    } else {
        println!("Leaf tasks ({}):", leaves.len());
        print_id_list(&analyzer, &leaves);
    }

    Ok(())
}

/// Show the longest-duration dependency chain
pub fn critical_path(
    output: &Output,
    store: Option<StoreBackend>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<()> {
    let start = start.map(parse_id).transpose()?;
    let end = end.map(parse_id).transpose()?;
    let analyzer = open_analyzer(output, "critical-path", store)?;

    let result = analyzer.critical_path(start.as_ref(), end.as_ref())?;

    if output.is_json() {
        output.data(&result);
    } else if result.path.is_empty() {
        println!("No tasks.");
    } else {
        println!("Critical path (total duration: {}s):", result.total_duration);
        for id in &result.path {
            let duration = analyzer.task(id).map(|t| t.duration()).unwrap_or(0);
            println!("  {:<20} {:>8}s  {}", id, duration, description(&analyzer, id));
        }
    }

    Ok(())
}

/// Check the graph for broken references and cycles. Fails when invalid.
pub fn validate(output: &Output, store: Option<StoreBackend>, ids: &[String]) -> Result<()> {
    let subset = parse_ids(ids)?;
    let analyzer = open_analyzer(output, "validate", store)?;

    let report = if subset.is_empty() {
        analyzer.validate(None)
    } else {
        analyzer.validate(Some(&subset))
    };

    if output.is_json() {
        output.data(&report);
    } else if report.valid {
        output.success(&format!(
            "Graph is valid ({} tasks, {} dependencies)",
            analyzer.graph().len(),
            analyzer.graph().edge_count()
        ));
    } else {
        println!("Graph is invalid ({} problems):", report.errors.len());
        for error in &report.errors {
            println!("  [{}] {}", error.kind(), error);
        }
    }

    if !report.valid {
        anyhow::bail!("Validation failed with {} problem(s)", report.errors.len());
    }

    Ok(())
}
