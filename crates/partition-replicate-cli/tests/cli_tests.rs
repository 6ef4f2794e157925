//! CLI integration tests for partition-replicate.
//!
//! These tests verify command-line argument parsing, help output,
//! dry-run planning and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Get a command for the partition-replicate binary.
fn cmd() -> Command {
    Command::cargo_bin("partition-replicate").unwrap()
}

const CONFIG: &str = r#"
source:
  type: postgres
  host: 127.0.0.1
  port: 1
  database: shop
  user: reader
  ssl_mode: disable
  table: orders
sink:
  type: postgres
  host: 127.0.0.1
  port: 1
  database: warehouse
  user: writer
  ssl_mode: disable
  table: orders_copy
replication:
  jobs: 3
  batch_size: 1000
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
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
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--source-table"))
        .stdout(predicate::str::contains("--source-columns"))
        .stdout(predicate::str::contains("--source-query"))
        .stdout(predicate::str::contains("--source-where"))
        .stdout(predicate::str::contains("--jobs"))
        .stdout(predicate::str::contains("--sink-table"))
        .stdout(predicate::str::contains("--sink-columns"))
        .stdout(predicate::str::contains("--batch-size"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("partition-replicate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests - Config Errors
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    // Missing file is an IO error, not a config error
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_empty_config_exits_with_code_2() {
    let file = NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let file = config_file("source:\n  type: mssql\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_zero_jobs_override_rejected() {
    let file = config_file(CONFIG);

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--dry-run", "--jobs", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("jobs"));
}

#[test]
fn test_unsupported_database_type() {
    let file = config_file(&CONFIG.replacen("type: postgres", "type: oracle", 1));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("source.type"));
}

// =============================================================================
// Dry Run Tests
// =============================================================================

#[test]
fn test_dry_run_prints_partition_statements() {
    let file = config_file(CONFIG);

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 partitions"))
        .stdout(predicate::str::contains("Partition 2"))
        .stdout(predicate::str::contains("SeqScan(orders)"))
        .stdout(predicate::str::contains("hashtext(ctid::text)"))
        .stdout(predicate::str::contains("width taken from the first source row"));
}

#[test]
fn test_dry_run_with_overrides() {
    let file = config_file(CONFIG);

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--dry-run",
            "--jobs",
            "2",
            "--source-query",
            "SELECT id, name FROM orders WHERE active",
            "--sink-columns",
            "id, name",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 partitions"))
        .stdout(predicate::str::contains(
            "SELECT * FROM (SELECT id, name FROM orders WHERE active) src WHERE",
        ))
        .stdout(predicate::str::contains(
            "INSERT INTO orders_copy (id, name) VALUES ($1, $2)",
        ));
}

#[test]
fn test_sink_table_supplied_on_command_line() {
    let file = config_file(&CONFIG.replacen("  table: orders_copy\n", "", 1));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sink.table"));

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--dry-run",
            "--sink-table",
            "orders_archive",
            "--sink-columns",
            "id, total",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 partitions"))
        .stdout(predicate::str::contains(
            "INSERT INTO orders_archive (id, total) VALUES ($1, $2)",
        ));
}

#[test]
fn test_dry_run_json_output() {
    let file = config_file(CONFIG);

    let output = cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--output-json",
            "run",
            "--dry-run",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["jobs"], 3);
    assert_eq!(plan["reads"].as_array().unwrap().len(), 3);
    assert!(plan["insert"].is_null());
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_health_check_unreachable_exits_with_code_3() {
    let file = config_file(CONFIG);

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("UNHEALTHY"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
