//! CLI integration tests for mdb-sqlite-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes, and a full run against SQLite files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;

/// Get a command for the mdb-sqlite-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("mdb-sqlite-migrate").unwrap()
}

fn create_source(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE child (
             id INTEGER PRIMARY KEY,
             parent_id INTEGER REFERENCES parent(id),
             label TEXT
         );
         CREATE TABLE parent (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO parent VALUES (1, 'a'), (2, 'b'), (3, 'c');
         INSERT INTO child VALUES (1, 1, 'x'), (2, 1, 'y'), (3, 2, 'z'), (4, 3, 'w'), (5, 3, 'v');",
    )
    .unwrap();
}

fn count(path: &Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM '{}'", table), [], |r| r.get(0))
        .unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--source"))
        .stdout(predicate::str::contains("--source-type"))
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--erase"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mdb-sqlite-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--progress"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "run"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_source_type_in_config_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  type: oracle").unwrap();
    writeln!(file, "  path: x.ora").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "inspect"])
        .assert()
        .code(1);
}

#[test]
fn test_no_source_exits_with_code_1() {
    cmd()
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--source"));
}

#[test]
fn test_missing_source_file_exits_with_code_2() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .args(["run", "--source-type", "sqlite", "--source"])
        .arg(dir.path().join("missing.sqlite"))
        .assert()
        .code(2);
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// End-to-end Tests
// =============================================================================

#[test]
fn test_inspect_prints_creation_order() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.sqlite");
    create_source(&source);

    cmd()
        .args(["inspect", "--source"])
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("1. parent"))
        .stdout(predicate::str::contains("2. child"));

    // Inspect never creates the target
    assert!(!dir.path().join("source.db").exists());
}

#[test]
fn test_inspect_cycle_exits_with_code_5() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("cycle.sqlite");
    let conn = rusqlite::Connection::open(&source).unwrap();
    conn.execute_batch(
        "CREATE TABLE a (id INTEGER PRIMARY KEY, b_id INTEGER REFERENCES b(id));
         CREATE TABLE b (id INTEGER PRIMARY KEY, a_id INTEGER REFERENCES a(id));
         CREATE TABLE c (id INTEGER PRIMARY KEY);",
    )
    .unwrap();
    drop(conn);

    cmd()
        .args(["inspect", "--source"])
        .arg(&source)
        .assert()
        .code(5)
        .stdout(predicate::str::contains("1. c"))
        .stdout(predicate::str::contains("Excluded (unresolved references): a, b"));
}

#[test]
fn test_inspect_unreadable_table_exits_with_code_2() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("long.sqlite");
    let long_name = "t".repeat(200);
    let conn = rusqlite::Connection::open(&source).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE \"{}\" (id INTEGER PRIMARY KEY);
         CREATE TABLE ok (id INTEGER PRIMARY KEY);",
        long_name
    ))
    .unwrap();
    drop(conn);

    cmd()
        .args(["inspect", "--source"])
        .arg(&source)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("1. ok"))
        .stdout(predicate::str::contains("Unreadable:"))
        .stdout(predicate::str::contains("Excluded").not());
}

#[test]
fn test_run_copies_tables() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.sqlite");
    let target = dir.path().join("out.db");
    create_source(&source);

    cmd()
        .args(["--output-json", "run", "--source"])
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""));

    assert_eq!(count(&target, "parent"), 3);
    assert_eq!(count(&target, "child"), 5);
}

#[test]
fn test_run_default_target_and_erase() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.sqlite");
    create_source(&source);

    cmd()
        .args(["run", "--source"])
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("Migration completed!"));

    let target = dir.path().join("source.db");
    assert_eq!(count(&target, "parent"), 3);

    // A second run onto the same file fails to create the tables...
    cmd()
        .args(["run", "--source"])
        .arg(&source)
        .assert()
        .code(4);

    // ...unless the target is erased first
    cmd()
        .args(["run", "--erase", "--source"])
        .arg(&source)
        .assert()
        .success();
    assert_eq!(count(&target, "child"), 5);
}

#[test]
fn test_progress_lines() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.sqlite");
    create_source(&source);

    cmd()
        .args(["--progress", "--verbosity", "error", "run", "--source"])
        .arg(&source)
        .assert()
        .success()
        .stderr(predicate::str::contains(
            r#"{"event":"table_completed","table":"child","rows":5}"#,
        ));
}
