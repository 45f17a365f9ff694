use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("cadence")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("cleanup"));
}

#[test]
fn test_stats_on_fresh_database() {
    let temp = tempfile::tempdir().expect("temp dir");
    let db_path = temp.path().join("cadence.db");

    Command::cargo_bin("cadence")
        .unwrap()
        .current_dir(temp.path())
        .env("CADENCE_DATABASE_PATH", db_path.to_string_lossy().as_ref())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Processing statistics"));
}

#[test]
fn test_run_on_fresh_database_reports_zero_work() {
    let temp = tempfile::tempdir().expect("temp dir");
    let db_path = temp.path().join("cadence.db");

    Command::cargo_bin("cadence")
        .unwrap()
        .current_dir(temp.path())
        .env("CADENCE_DATABASE_PATH", db_path.to_string_lossy().as_ref())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Materialization run finished"))
        .stdout(predicate::str::contains("instances created:       0"));
}
