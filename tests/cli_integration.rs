//! CLI integration tests for dagplan
//!
//! These tests drive the binary end to end: project setup, task and
//! dependency management, and every graph analysis command on both stores.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the dagplan binary
fn dagplan_cmd() -> assert_cmd::Command {
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("dagplan"))
}

/// Create a temporary directory and initialize a dagplan project
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    dagplan_cmd().arg("init").arg(dir.path()).assert().success();
    dir
}

/// Adds a task with an explicit id, duration and prerequisites
fn add_task(dir: &Path, id: &str, duration: u64, after: &[&str]) {
    let mut cmd = dagplan_cmd();
    cmd.current_dir(dir)
        .args(["task", "add", &format!("Task {id}"), "--id", id])
        .args(["--duration", &duration.to_string()]);
    for prereq in after {
        cmd.args(["--after", prereq]);
    }
    cmd.assert().success();
}

/// Runs a command with `--format json` and parses stdout
fn json(dir: &Path, args: &[&str]) -> serde_json::Value {
    let output = dagplan_cmd()
        .current_dir(dir)
        .args(args)
        .args(["--format", "json"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    serde_json::from_str(&stdout).unwrap()
}

fn ids(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

/// Writes raw task records, bypassing the CLI's own checks
fn write_tasks(dir: &Path, records: &[(&str, &[&str])]) {
    let lines: Vec<String> = records
        .iter()
        .map(|(id, deps)| {
            serde_json::json!({
                "id": id,
                "description": format!("Task {id}"),
                "depends_on": deps,
                "created_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-01T00:00:00Z",
            })
            .to_string()
        })
        .collect();
    fs::write(
        dir.join(".dagplan/tasks.jsonl"),
        lines.join("\n") + "\n",
    )
    .unwrap();
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_init_creates_structure() {
    let dir = TempDir::new().unwrap();

    dagplan_cmd()
        .arg("init")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized dagplan project"));

    assert!(dir.path().join(".dagplan").is_dir());
    assert!(dir.path().join(".dagplan/config.toml").is_file());
    assert!(dir.path().join(".dagplan/.gitignore").is_file());
}

#[test]
fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();

    dagplan_cmd().arg("init").arg(dir.path()).assert().success();
    dagplan_cmd().arg("init").arg(dir.path()).assert().success();
}

#[test]
fn test_commands_outside_project_fail() {
    let dir = TempDir::new().unwrap();

    dagplan_cmd()
        .current_dir(dir.path())
        .arg("order")
        .assert()
        .failure()
        .stderr(predicate::str::contains("dagplan init"));
}

// =============================================================================
// Task Tests
// =============================================================================

#[test]
fn test_task_add_generates_id() {
    let dir = setup_project();

    let task = json(dir.path(), &["task", "add", "Write the parser"]);
    let id = task["id"].as_str().unwrap();

    assert!(id.starts_with("t-"));
    assert_eq!(id.len(), 9);
    assert_eq!(task["description"], "Write the parser");
    assert_eq!(task["status"], "pending");

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Write the parser"));
}

#[test]
fn test_task_add_rejects_bad_input() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);

    // Duplicate id
    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "add", "again", "--id", "A"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    // Malformed id
    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "add", "spaces", "--id", "has space"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid parameter"));

    // Priority out of range
    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "add", "loud", "--priority", "11"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("priority"));

    // Missing prerequisite
    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "add", "orphan", "--after", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_task_lifecycle() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);
    add_task(dir.path(), "B", 1, &["A"]);

    let ready = json(dir.path(), &["ready"]);
    assert_eq!(ready.as_array().unwrap().len(), 1);
    assert_eq!(ready[0]["id"], "A");

    let blocked = json(dir.path(), &["blocked"]);
    assert_eq!(blocked[0]["id"], "B");
    assert_eq!(ids(&blocked[0]["blocked_by"]), vec!["A"]);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "start", "A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started task: A"));

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "done", "A"])
        .assert()
        .success();

    let ready = json(dir.path(), &["ready"]);
    assert_eq!(ready[0]["id"], "B");
    assert!(json(dir.path(), &["blocked"]).as_array().unwrap().is_empty());

    let shown = json(dir.path(), &["task", "show", "A"]);
    assert_eq!(shown["task"]["status"], "completed");
    assert!(shown["task"]["completed_at"].is_string());
    assert_eq!(ids(&shown["dependents"]), vec!["B"]);
}

#[test]
fn test_task_set_updates_fields() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);

    let task = json(
        dir.path(),
        &["task", "set", "A", "--priority", "9", "--duration", "42"],
    );
    assert_eq!(task["priority"], 9);
    assert_eq!(task["estimated_duration"], 42);
}

#[test]
fn test_unknown_task_is_reported() {
    let dir = setup_project();

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "start", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task not found: nope"));
}

// =============================================================================
// Dependency Tests
// =============================================================================

#[test]
fn test_dep_rejects_cycles_and_self_edges() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);
    add_task(dir.path(), "B", 1, &["A"]);
    add_task(dir.path(), "C", 1, &["B"]);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "dep", "A", "C"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Circular dependency detected: A -> B -> C -> A",
        ));

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "dep", "A", "A"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Self-dependency"));

    // Store is unchanged and still valid
    dagplan_cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn test_dep_and_undep_refresh_depths() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);
    add_task(dir.path(), "B", 1, &[]);
    add_task(dir.path(), "C", 1, &["B"]);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "dep", "B", "A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("B now depends on A"));

    let depth_of = |id: &str| {
        let shown = json(dir.path(), &["task", "show", id]);
        shown["task"]["depth"].as_u64().unwrap()
    };
    assert_eq!(depth_of("C"), 2);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "undep", "B", "A"])
        .assert()
        .success();
    assert_eq!(depth_of("C"), 1);
}

// =============================================================================
// Graph Analysis Tests
// =============================================================================

#[test]
fn test_order_respects_dependencies_and_priority() {
    let dir = setup_project();
    add_task(dir.path(), "build", 1, &[]);
    add_task(dir.path(), "docs", 1, &[]);
    add_task(dir.path(), "test", 1, &["build"]);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "set", "docs", "--priority", "8"])
        .assert()
        .success();

    let order = json(dir.path(), &["order"]);
    assert_eq!(ids(&order["order"]), vec!["docs", "build", "test"]);

    let subset = json(dir.path(), &["order", "test", "build"]);
    assert_eq!(ids(&subset["order"]), vec!["build", "test"]);

    let levels = json(dir.path(), &["levels"]);
    assert_eq!(ids(&levels["levels"][0]), vec!["docs", "build"]);
    assert_eq!(ids(&levels["levels"][1]), vec!["test"]);
}

#[test]
fn test_ancestors_and_descendants() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);
    add_task(dir.path(), "B", 1, &["A"]);
    add_task(dir.path(), "C", 1, &["B"]);

    let up = json(dir.path(), &["ancestors", "C"]);
    let reached: Vec<_> = up["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| (r["id"].as_str().unwrap().to_string(), r["depth"].as_u64().unwrap()))
        .collect();
    assert_eq!(reached, vec![("B".to_string(), 1), ("A".to_string(), 2)]);

    let limited = json(dir.path(), &["descendants", "A", "--max-depth", "1"]);
    assert_eq!(limited["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(limited["beyond_limit"], 1);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["ancestors", "C", "--max-depth", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid parameter"));

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["descendants", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task not found: ghost"));
}

#[test]
fn test_orphans_and_leaves() {
    let dir = setup_project();
    add_task(dir.path(), "root", 1, &[]);
    add_task(dir.path(), "child", 1, &["root"]);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "add", "mine", "--id", "mine", "--origin", "human"])
        .assert()
        .success();

    let orphans = json(dir.path(), &["orphans"]);
    assert_eq!(ids(&orphans["orphans"]), vec!["root"]);

    let with_human = json(dir.path(), &["orphans", "--include-human"]);
    assert_eq!(ids(&with_human["orphans"]), vec!["root", "mine"]);

    let isolated = json(dir.path(), &["orphans", "--rule", "isolated", "--include-human"]);
    assert_eq!(ids(&isolated["orphans"]), vec!["mine"]);

    let leaves = json(dir.path(), &["leaves"]);
    assert_eq!(ids(&leaves["leaves"]), vec!["child", "mine"]);

    let completed = json(dir.path(), &["leaves", "--status", "completed"]);
    assert!(ids(&completed["leaves"]).is_empty());
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scenario_a_chain_critical_path() {
    let dir = setup_project();
    add_task(dir.path(), "A", 10, &[]);
    add_task(dir.path(), "B", 20, &["A"]);
    add_task(dir.path(), "C", 30, &["B"]);
    add_task(dir.path(), "D", 5, &["C"]);

    let path = json(dir.path(), &["critical-path"]);
    assert_eq!(ids(&path["path"]), vec!["A", "B", "C", "D"]);
    assert_eq!(path["total_duration"], 65);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["task", "set", "A", "--duration", "0"])
        .assert()
        .success();

    let from_a = json(dir.path(), &["critical-path", "--start", "A"]);
    assert_eq!(ids(&from_a["path"]), vec!["A", "B", "C", "D"]);
    assert_eq!(from_a["total_duration"], 55);

    dagplan_cmd()
        .current_dir(dir.path())
        .arg("critical-path")
        .assert()
        .success()
        .stdout(predicate::str::contains("total duration: 55s"));
}

#[test]
fn test_scenario_b_diamond_prefers_longer_branch() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);
    add_task(dir.path(), "B", 5, &["A"]);
    add_task(dir.path(), "C", 50, &["A"]);
    add_task(dir.path(), "D", 1, &["B", "C"]);

    let path = json(dir.path(), &["critical-path"]);
    assert_eq!(ids(&path["path"]), vec!["A", "C", "D"]);
    assert_eq!(path["total_duration"], 52);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["critical-path", "--start", "B", "--end", "C"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No path exists from B to C"));
}

#[test]
fn test_scenario_c_cycle_fails_validation() {
    let dir = setup_project();
    write_tasks(dir.path(), &[("A", &["C"]), ("B", &["A"]), ("C", &["B"])]);

    let output = dagplan_cmd()
        .current_dir(dir.path())
        .args(["validate", "--format", "json"])
        .assert()
        .failure();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(report["valid"], false);
    assert_eq!(report["errors"][0]["kind"], "circular_dependency");
    let mut cycle = ids(&report["errors"][0]["cycle"]);
    cycle.sort();
    assert_eq!(cycle, vec!["A", "B", "C"]);

    dagplan_cmd()
        .current_dir(dir.path())
        .arg("order")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Circular dependency detected"));
}

#[test]
fn test_scenario_d_broken_reference() {
    let dir = setup_project();
    write_tasks(dir.path(), &[("X", &["ghost"])]);

    dagplan_cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[broken_reference]"))
        .stdout(predicate::str::contains("ghost"));

    // Readiness does not need a valid graph
    dagplan_cmd()
        .current_dir(dir.path())
        .arg("blocked")
        .assert()
        .success()
        .stdout(predicate::str::contains("ghost"));
}

#[test]
fn test_scenario_e_empty_graph() {
    let dir = setup_project();

    let order = json(dir.path(), &["order"]);
    assert!(ids(&order["order"]).is_empty());

    let path = json(dir.path(), &["critical-path"]);
    assert!(ids(&path["path"]).is_empty());
    assert_eq!(path["total_duration"], 0);

    dagplan_cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Graph is valid"));
}

// =============================================================================
// Store and Cache Tests
// =============================================================================

#[test]
fn test_sqlite_store_matches_jsonl() {
    let dir = setup_project();
    add_task(dir.path(), "A", 3, &[]);
    add_task(dir.path(), "B", 4, &["A"]);

    let from_jsonl = json(dir.path(), &["critical-path"]);
    let from_sqlite = json(dir.path(), &["critical-path", "--store", "sqlite"]);
    assert_eq!(from_jsonl, from_sqlite);

    // A later edit is picked up by the mirror
    add_task(dir.path(), "C", 10, &["B"]);
    let updated = json(dir.path(), &["order", "--store", "sqlite"]);
    assert_eq!(ids(&updated["order"]), vec!["A", "B", "C"]);
}

#[test]
fn test_cache_commands() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);
    add_task(dir.path(), "B", 1, &["A"]);

    let rebuilt = json(dir.path(), &["cache", "rebuild"]);
    assert_eq!(rebuilt["tasks"], 2);
    assert_eq!(rebuilt["dependencies"], 1);

    let status = json(dir.path(), &["cache", "status"]);
    assert_eq!(status["stale"], false);
    assert_eq!(status["tasks"]["by_status"]["pending"], 2);

    dagplan_cmd()
        .current_dir(dir.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));
}

#[test]
fn test_status_overview() {
    let dir = setup_project();
    add_task(dir.path(), "A", 10, &[]);
    add_task(dir.path(), "B", 5, &["A"]);

    let status = json(dir.path(), &["status"]);
    assert_eq!(status["tasks"]["total"], 2);
    assert_eq!(status["tasks"]["ready"], 1);
    assert_eq!(status["tasks"]["blocked"], 1);
    assert_eq!(status["valid"], true);
    assert_eq!(status["critical_path"]["total_duration"], 15);
}

#[test]
fn test_verbose_logs_go_to_stderr() {
    let dir = setup_project();
    add_task(dir.path(), "A", 1, &[]);

    let output = dagplan_cmd()
        .current_dir(dir.path())
        .args(["--verbose", "order", "--format", "json"])
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded"));

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(ids(&parsed["order"]), vec!["A"]);
}
