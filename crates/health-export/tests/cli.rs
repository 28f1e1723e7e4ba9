//! Tests for the `health` binary
//!
//! Every run passes `--db` so nothing touches the user's data directory.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FIXTURE: &str = include_str!("fixtures/export_small.xml");

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("health"))
}

/// Import the fixture into a fresh database and return its path
fn imported_db(dir: &Path) -> PathBuf {
    let export = dir.join("export.xml");
    std::fs::write(&export, FIXTURE).unwrap();
    let db = dir.join("health.db");

    cli()
        .arg("--db")
        .arg(&db)
        .arg("import")
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("Import complete"));
    db
}

fn json_stdout(args: &[&str], db: &Path) -> serde_json::Value {
    let output = cli()
        .arg("--db")
        .arg(db)
        .args(["--format", "json"])
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_missing_database_hint_goes_to_stderr() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("missing.db");

    for command in ["metrics", "activity"] {
        cli()
            .arg("--db")
            .arg(&db)
            .args(["--format", "json", command])
            .assert()
            .success()
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("No database found"));
    }
    assert!(!db.exists());
}

#[test]
fn test_import_json_is_parseable() {
    let temp = TempDir::new().unwrap();
    let export = temp.path().join("export.xml");
    std::fs::write(&export, FIXTURE).unwrap();

    let stats = json_stdout(&["import", export.to_str().unwrap()], &temp.path().join("h.db"));
    assert_eq!(stats["inserted"], 7);
    assert_eq!(stats["summaries"], 2);
}

#[test]
fn test_summary_json() {
    let temp = TempDir::new().unwrap();
    let db = imported_db(temp.path());

    let buckets = json_stdout(&["summary", "steps", "--by", "day"], &db);
    let buckets = buckets.as_array().unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0]["bucket_start"], "2024-03-10");
    assert_eq!(buckets[0]["sum"], 712.0);
}

#[test]
fn test_asleep_sleep_summary() {
    let temp = TempDir::new().unwrap();
    let db = imported_db(temp.path());

    let buckets = json_stdout(&["summary", "sleep_stage", "--durations", "--asleep"], &db);
    assert_eq!(buckets[0]["count"], 1);

    cli()
        .arg("--db")
        .arg(&db)
        .args(["summary", "steps", "--asleep"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_activity_days() {
    let temp = TempDir::new().unwrap();
    let db = imported_db(temp.path());

    let days = json_stdout(&["activity", "--from", "2024-03-11"], &db);
    let days = days.as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["day"], "2024-03-11");
    assert_eq!(days[0]["active_energy_kcal"], 480.0);

    cli()
        .arg("--db")
        .arg(&db)
        .arg("activity")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 days, all rings closed on 0"));
}
