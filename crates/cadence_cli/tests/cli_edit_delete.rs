use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("tasks.json")
}

fn command(dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cadence"));
    command
        .env("CADENCE_STORE_PATH", store_path(dir))
        .env("CADENCE_CONFIG_PATH", dir.path().join("config.json"))
        .env("CADENCE_NOW", "2025-01-31T09:00:00Z");
    command
}

fn run(dir: &TempDir, args: &[&str]) -> Output {
    command(dir)
        .args(args)
        .output()
        .expect("failed to run cadence")
}

fn stored_tasks(dir: &TempDir) -> Vec<serde_json::Value> {
    let content = std::fs::read_to_string(store_path(dir)).expect("store file");
    let stored: serde_json::Value = serde_json::from_str(&content).expect("store json");
    stored["tasks"].as_array().expect("tasks array").clone()
}

fn add_plain(dir: &TempDir, title: &str) -> String {
    let output = run(dir, &["add", title, "--json"]);
    assert!(output.status.success());
    let task: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    task["id"].as_str().unwrap().to_string()
}

#[test]
fn add_without_title_fails_with_error_code() {
    let dir = TempDir::new().unwrap();

    let output = run(&dir, &["add"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input - title is required"));
}

#[test]
fn add_records_details() {
    let dir = TempDir::new().unwrap();
    let output = run(
        &dir,
        &[
            "add",
            "Call plumber",
            "--project",
            "house",
            "--tag",
            "#Home",
            "--tag",
            "home",
            "--priority",
            "high",
            "--note",
            "ask about the boiler",
        ],
    );
    assert!(output.status.success());

    let tasks = stored_tasks(&dir);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["project"], "house");
    assert_eq!(tasks[0]["tags"], serde_json::json!(["home"]));
    assert_eq!(tasks[0]["priority"], "high");
    assert_eq!(tasks[0]["note"], "ask about the boiler");
    assert_eq!(tasks[0]["status"], "not_started");
    assert!(tasks[0]["due_date"].is_null());
}

#[test]
fn edit_updates_title_and_due_date() {
    let dir = TempDir::new().unwrap();
    let id = add_plain(&dir, "old");

    let output = run(&dir, &["edit", &id, "new title", "--due", "2025-02-14"]);
    assert!(output.status.success());

    let tasks = stored_tasks(&dir);
    assert_eq!(tasks[0]["title"], "new title");
    assert_eq!(tasks[0]["due_date"], "2025-02-14");
}

#[test]
fn edit_without_changes_is_rejected() {
    let dir = TempDir::new().unwrap();
    let id = add_plain(&dir, "old");

    let output = run(&dir, &["edit", &id]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input - nothing to change"));
}

#[test]
fn edit_rejects_bad_date() {
    let dir = TempDir::new().unwrap();
    let id = add_plain(&dir, "old");

    let output = run(&dir, &["edit", &id, "--due", "14/02/2025"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input - date must be YYYY-MM-DD"));
}

#[test]
fn delete_removes_task() {
    let dir = TempDir::new().unwrap();
    let keep = add_plain(&dir, "keep");
    let drop = add_plain(&dir, "drop");

    let output = run(&dir, &["delete", &drop]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Deleted task: drop"));

    let tasks = stored_tasks(&dir);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], keep.as_str());
}

#[test]
fn show_unknown_task_fails() {
    let dir = TempDir::new().unwrap();
    add_plain(&dir, "keep");

    let output = run(&dir, &["show", "task-missing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input - task not found"));
}

#[test]
fn show_orphaned_instance_still_works() {
    let dir = TempDir::new().unwrap();
    assert!(run(&dir, &["add", "Stretch", "--repeat", "daily"]).status.success());
    let tasks = stored_tasks(&dir);
    let template = tasks
        .iter()
        .find(|task| task["recurring_parent_id"].is_null())
        .and_then(|task| task["id"].as_str())
        .unwrap()
        .to_string();
    let instance = tasks
        .iter()
        .find(|task| task["recurring_parent_id"].is_string())
        .and_then(|task| task["id"].as_str())
        .unwrap()
        .to_string();
    assert!(run(&dir, &["delete", &template]).status.success());

    let shown = run(&dir, &["show", &instance]);
    assert!(shown.status.success());
    assert!(String::from_utf8_lossy(&shown.stdout).contains("Stretch"));

    let series = run(&dir, &["series", &instance]);
    assert!(!series.status.success());
    assert!(String::from_utf8_lossy(&series.stderr).contains("ERROR: ambiguous_parent"));

    let done = run(&dir, &["done", &instance, "--json"]);
    assert!(done.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&done.stdout).unwrap();
    assert_eq!(outcome["updated"]["status"], "done");
    assert!(outcome["new_instance"].is_null());
}

#[test]
fn series_lists_template_and_instances() {
    let dir = TempDir::new().unwrap();
    assert!(run(&dir, &["add", "Stretch", "--repeat", "daily"]).status.success());
    let instance = stored_tasks(&dir)
        .into_iter()
        .find(|task| task["recurring_parent_id"].is_string())
        .and_then(|task| task["id"].as_str().map(str::to_string))
        .unwrap();
    assert!(run(&dir, &["done", &instance]).status.success());

    let output = run(&dir, &["series", &instance, "--json"]);
    assert!(output.status.success());
    let series: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(series["template"]["role"], "template");
    let instances = series["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0]["due_date"], "2025-01-31");
    assert_eq!(instances[1]["due_date"], "2025-02-01");
}

#[test]
fn interactive_mode_runs_commands_until_exit() {
    let dir = TempDir::new().unwrap();
    let mut child = command(&dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cadence");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        stdin
            .write_all(b"add \"Buy milk\"\nbogus\nlist backlog\nexit\n")
            .unwrap();
    }

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Added task: Buy milk"));
    assert!(stdout.contains("Buy milk"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input"));
    assert_eq!(stored_tasks(&dir).len(), 1);
}
