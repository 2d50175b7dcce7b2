//! Cache CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::domain::TaskStatus;
use crate::storage::Project;

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Rebuild the cache from tasks.jsonl
    Rebuild,

    /// Show cache status
    Status,

    /// Empty the cache (it is rebuilt on next use)
    Clear,
}

pub fn run(cmd: CacheCommands, output: &Output) -> Result<()> {
    match cmd {
        CacheCommands::Rebuild => rebuild(output),
        CacheCommands::Status => status(output),
        CacheCommands::Clear => clear(output),
    }
}

fn rebuild(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    output.verbose("Rebuilding cache from tasks.jsonl");

    let start = std::time::Instant::now();
    let cache = project.rebuild_cache()?;
    let duration = start.elapsed();

    let tasks: usize = cache.task_counts()?.values().sum();
    let edges = cache.edge_count()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "rebuilt": true,
            "duration_ms": duration.as_millis(),
            "tasks": tasks,
            "dependencies": edges,
        }));
    } else {
        output.success(&format!(
            "Cache rebuilt in {:?} ({} tasks, {} dependencies)",
            duration, tasks, edges
        ));
    }

    Ok(())
}

fn status(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let cache = project.cache()?;

    let is_stale = cache.is_stale()?;
    let counts = cache.task_counts()?;
    let total: usize = counts.values().sum();
    let edges = cache.edge_count()?;

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
            "path": cache.path().display().to_string(),
            "stale": is_stale,
            "tasks": {
                "total": total,
                "by_status": by_status,
            },
            "dependencies": edges,
        }));
    } else {
        println!("Cache Status");
        println!("{}", "=".repeat(40));
        println!("Path: {}", cache.path().display());
        println!(
            "Status: {}",
            if is_stale {
                "STALE (needs rebuild)"
            } else {
                "fresh"
            }
        );
        println!();
        println!("Cached Data:");
        println!("  Tasks: {}", total);
        for status in TaskStatus::ALL {
            if let Some(count) = counts.get(&status).filter(|c| **c > 0) {
                println!("    {:<10} {}", status, count);
            }
        }
        println!("  Dependencies: {}", edges);

        if is_stale {
            println!();
            println!("Run 'dagplan cache rebuild' to update the cache.");
        }
    }

    Ok(())
}

fn clear(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    project.cache()?.clear()?;
    output.success("Cache cleared");
    Ok(())
}
