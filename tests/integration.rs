//! Integration tests for tablesync.
//!
//! Tests touching a real packet filter require root and are marked with #[ignore].
//! Run with: `sudo cargo test --release -- --ignored`

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the tablesync binary
fn run_tablesync(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tablesync"))
        .args(args)
        .output()
        .expect("Failed to execute tablesync")
}

fn write_config(dir: &TempDir, aliases: &str) -> String {
    let config = format!(
        "snapshot_dir: {root}/tables\nlock_file: {root}/tablesync.lock\ngeoip_dir: {root}/geoip\nbackend: nftables\naliases:\n{aliases}",
        root = dir.path().display(),
        aliases = aliases
    );
    let path = dir.path().join("filter_tables.yaml");
    fs::write(&path, config).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_version_command() {
    let output = run_tablesync(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("tablesync "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_command() {
    let output = run_tablesync(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("update"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_update_help_lists_options() {
    let output = run_tablesync(&["update", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--aliases"));
    assert!(stdout.contains("--output"));
}

#[test]
fn test_update_missing_config_is_fatal() {
    let output = run_tablesync(&["update", "--config", "/nonexistent/filter_tables.yaml"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty(), "no run result on fatal errors");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("filter table configuration error"));
}

#[test]
fn test_update_invalid_alias_name_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "  - name: \"bad name\"\n    type: host\n");

    let output = run_tablesync(&["update", "--config", &config]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_update_duplicate_alias_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "  - name: lan\n    type: host\n  - name: lan\n    type: network\n",
    );

    let output = run_tablesync(&["update", "--config", &config]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_output_format() {
    let output = run_tablesync(&["update", "--output", "xml"]);
    assert!(!output.status.success());
}

#[test]
#[ignore] // Requires root and nft
fn test_full_update_nftables() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "  - name: ts_itest\n    type: host\n    content: [192.0.2.1, 198.51.100.0/24]\n",
    );

    let output = run_tablesync(&["update", "--config", &config]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), r#"{"status":"ok"}"#);

    let snapshot = fs::read_to_string(dir.path().join("tables/ts_itest.txt")).unwrap();
    assert_eq!(snapshot, "192.0.2.1\n198.51.100.0/24");
    assert!(dir.path().join("tables/ts_itest.marker.json").exists());

    // Remove the alias again so the reaper cleans up the set
    let config = write_config(&dir, "  []\n");
    let output = run_tablesync(&["update", "--config", &config]);
    assert!(output.status.success());
    assert!(!dir.path().join("tables/ts_itest.txt").exists());
}
