use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("tasks.json")
}

fn config_path(dir: &TempDir) -> PathBuf {
    dir.path().join("config.json")
}

fn run(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cadence"))
        .args(args)
        .env("CADENCE_STORE_PATH", store_path(dir))
        .env("CADENCE_CONFIG_PATH", config_path(dir))
        .env("CADENCE_NOW", "2025-01-31T09:00:00Z")
        .output()
        .expect("failed to run cadence")
}

fn template_id(dir: &TempDir) -> String {
    let content = std::fs::read_to_string(store_path(dir)).expect("store file");
    let stored: serde_json::Value = serde_json::from_str(&content).expect("store json");
    stored["tasks"]
        .as_array()
        .expect("tasks array")
        .iter()
        .find(|task| task["recurring_parent_id"].is_null())
        .and_then(|task| task["id"].as_str().map(str::to_string))
        .expect("template")
}

fn preview_json(dir: &TempDir, args: &[&str]) -> Vec<String> {
    let output = run(dir, args);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("preview json")
}

#[test]
fn preview_clamps_month_end_days() {
    let dir = TempDir::new().unwrap();
    assert!(
        run(&dir, &["add", "Pay rent", "--due", "2025-01-31", "--repeat", "monthly"])
            .status
            .success()
    );
    let id = template_id(&dir);

    let dates = preview_json(&dir, &["preview", &id, "--count", "3", "--json"]);
    assert_eq!(dates, vec!["2025-02-28", "2025-03-31", "2025-04-30"]);
}

#[test]
fn preview_stops_at_end_date() {
    let dir = TempDir::new().unwrap();
    assert!(
        run(
            &dir,
            &[
                "add",
                "Pay rent",
                "--due",
                "2025-01-31",
                "--repeat",
                "monthly",
                "--until",
                "2025-03-31",
            ],
        )
        .status
        .success()
    );
    let id = template_id(&dir);

    let dates = preview_json(&dir, &["preview", &id, "--count", "10", "--json"]);
    assert_eq!(dates, vec!["2025-02-28", "2025-03-31"]);
}

#[test]
fn preview_count_defaults_to_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(config_path(&dir), r#"{ "preview_count": 3 }"#).unwrap();
    assert!(run(&dir, &["add", "Stretch", "--repeat", "daily"]).status.success());
    let id = template_id(&dir);

    let dates = preview_json(&dir, &["preview", &id, "--json"]);
    assert_eq!(dates, vec!["2025-02-01", "2025-02-02", "2025-02-03"]);

    let overridden = preview_json(
        &dir,
        &["preview", &id, "--json", "--config-override", "preview-count=1"],
    );
    assert_eq!(overridden, vec!["2025-02-01"]);
}

#[test]
fn preview_from_explicit_start() {
    let dir = TempDir::new().unwrap();
    assert!(
        run(&dir, &["add", "Gym", "--repeat", "weekly", "--on", "mon,thu"])
            .status
            .success()
    );
    let id = template_id(&dir);

    let dates = preview_json(
        &dir,
        &["preview", &id, "--count", "3", "--from", "2025-03-01", "--json"],
    );
    assert_eq!(dates, vec!["2025-03-03", "2025-03-06", "2025-03-10"]);
}

#[test]
fn preview_of_plain_task_is_empty() {
    let dir = TempDir::new().unwrap();
    assert!(run(&dir, &["add", "Buy milk"]).status.success());
    let id = template_id(&dir);

    let output = run(&dir, &["preview", &id]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No upcoming occurrences."));
}

#[test]
fn preview_rejects_out_of_range_count() {
    let dir = TempDir::new().unwrap();
    assert!(run(&dir, &["add", "Stretch", "--repeat", "daily"]).status.success());
    let id = template_id(&dir);

    let output = run(&dir, &["preview", &id, "--count", "0"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input - preview_count must be between 1 and 100"));
}

#[test]
fn broken_config_warns_and_uses_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(config_path(&dir), "{ broken").unwrap();
    assert!(run(&dir, &["add", "Stretch", "--repeat", "daily"]).status.success());
    let id = template_id(&dir);

    let output = run(&dir, &["preview", &id, "--json"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("WARNING: invalid_data"));
    let dates: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(dates.len(), 5);
}
