//! Query commands (ready, blocked, status)
//!
//! Readiness comes straight from the graph and does not require the graph to
//! be acyclic, so these still work while `validate` is failing.

use std::collections::HashMap;

use anyhow::Result;

use super::graph_cmd::open_analyzer;
use super::output::Output;
use crate::analysis::Analyzer;
use crate::domain::{TaskId, TaskStatus};
use crate::storage::StoreBackend;

/// Prerequisites of `id` that are not completed yet, missing ones included
fn open_blockers(analyzer: &Analyzer, id: &TaskId) -> Vec<TaskId> {
    let graph = analyzer.graph();
    graph
        .prerequisites_of(id)
        .into_iter()
        .filter(|p| {
            analyzer
                .task(p)
                .map_or(true, |t| !t.status.is_complete())
        })
        .chain(graph.missing_prerequisites(id).iter().cloned())
        .collect()
}

/// Show tasks ready to work on
pub fn ready(output: &Output, store: Option<StoreBackend>) -> Result<()> {
    let analyzer = open_analyzer(output, "ready", store)?;
    let ready = analyzer.ready_tasks();
    output.verbose_ctx("ready", &format!("Found {} ready tasks", ready.len()));

    if output.is_json() {
        let items: Vec<_> = ready
            .iter()
            .filter_map(|id| analyzer.task(id))
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "description": t.description,
                    "priority": t.priority,
                    "status": t.status,
                })
            })
            .collect();
        output.data(&items);
    } else if ready.is_empty() {
        println!("No tasks ready to work on.");
    } else {
        println!("Ready tasks ({}):", ready.len());
        println!("{:<20} {:<4} DESCRIPTION", "ID", "PRI");
        println!("{}", "-".repeat(60));
        for task in ready.iter().filter_map(|id| analyzer.task(id)) {
            println!("{:<20} {:<4} {}", task.id, task.priority, task.description);
        }
    }

    Ok(())
}

/// Show blocked tasks
pub fn blocked(output: &Output, store: Option<StoreBackend>) -> Result<()> {
    let analyzer = open_analyzer(output, "blocked", store)?;
    let blocked: Vec<(TaskId, Vec<TaskId>)> = analyzer
        .blocked_tasks()
        .into_iter()
        .map(|id| {
            let blockers = open_blockers(&analyzer, &id);
            (id, blockers)
        })
        .collect();
    output.verbose_ctx("blocked", &format!("Found {} blocked tasks", blocked.len()));

    if output.is_json() {
        let items: Vec<_> = blocked
            .iter()
            .map(|(id, blockers)| {
                serde_json::json!({
                    "id": id,
                    "description": analyzer.task(id).map(|t| t.description.as_str()),
                    "blocked_by": blockers,
                })
            })
            .collect();
        output.data(&items);
    } else if blocked.is_empty() {
        println!("No blocked tasks.");
    } else {
        println!("Blocked tasks ({}):", blocked.len());
        println!("{:<20} {:<30} BLOCKED BY", "ID", "DESCRIPTION");
        println!("{}", "-".repeat(80));
        for (id, blockers) in &blocked {
            let description = analyzer.task(id).map_or("", |t| t.description.as_str());
            let blockers: Vec<&str> = blockers.iter().map(TaskId::as_str).collect();
            println!("{:<20} {:<30} {}", id, description, blockers.join(", "));
        }
    }

    Ok(())
}

/// Show project status overview
pub fn status(output: &Output, store: Option<StoreBackend>) -> Result<()> {
    let analyzer = open_analyzer(output, "status", store)?;

    let mut counts: HashMap<TaskStatus, usize> = HashMap::new();
    for task in analyzer.tasks() {
        *counts.entry(task.status).or_default() += 1;
    }
    let total = analyzer.graph().len();
    let ready_count = analyzer.ready_tasks().len();
    let blocked_count = analyzer.blocked_tasks().len();

    let report = analyzer.validate(None);
    let critical = if report.valid {
        analyzer.critical_path(None, None).ok()
    } else {
        None
    };

    if output.is_json() {
        let by_status: serde_json::Map<String, serde_json::Value> = TaskStatus::ALL
            .iter()
            .map(|s| {
                (
                    s.as_str().to_string(),
                    counts.get(s).copied().unwrap_or(0).into(),
                )
            })
            .collect();

        output.data(&serde_json::json!({
            "tasks": {
                "total": total,
                "by_status": by_status,
                "ready": ready_count,
                "blocked": blocked_count,
            },
            "dependencies": analyzer.graph().edge_count(),
            "valid": report.valid,
            "problems": report.errors.len(),
            "critical_path": critical,
        }));
    } else {
        println!("Project Status");
        println!("{}", "=".repeat(40));
        println!();
        println!("Tasks: {} total", total);
        for status in TaskStatus::ALL {
            let count = counts.get(&status).copied().unwrap_or(0);
            if count > 0 {
                println!("  {:<12} {}", format!("{}:", status), count);
            }
        }
        println!();
        println!("  Ready to work:   {}", ready_count);
        println!("  Blocked:         {}", blocked_count);
        println!();
        println!("Dependencies: {}", analyzer.graph().edge_count());

        if report.valid {
            println!("Graph: valid");
        } else {
            println!(
                "Graph: INVALID ({} problems, run 'dagplan validate')",
                report.errors.len()
            );
        }

        if let Some(path) = critical.filter(|cp| !cp.path.is_empty()) {
            println!(
                "Critical path: {} tasks, {}s",
                path.path.len(),
                path.total_duration
            );
        }
    }

    Ok(())
}
