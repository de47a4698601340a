//! CLI integration tests
//!
//! Runs the partline binary end to end against its in-process broker.

use std::process::{Command, Output};

fn partline(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_partline"))
        .args(args)
        .env_remove("PARTLINE_CONFIG")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute partline")
}

#[test]
fn test_help_flag() {
    let output = partline(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("produce"));
    assert!(stdout.contains("consume"));
}

#[test]
fn test_invalid_subcommand_fails() {
    let output = partline(&["nonexistent-command"]);
    assert!(!output.status.success());
}

#[test]
fn test_produce_sync_prints_acknowledgments() {
    let output = partline(&["produce", "sync", "--count", "3"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("SEND_OK").count(), 3);
}

#[test]
fn test_demo_orderly_checks_order() {
    let output = partline(&["demo", "orderly"]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Every order was consumed step by step"));
}

#[test]
fn test_invalid_config_file_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("partline.toml");
    std::fs::write(&path, "[consumer]\nmax_active_lanes = 0\n").unwrap();

    let output = partline(&["--config", path.to_str().unwrap(), "produce", "oneway"]);
    assert!(!output.status.success());
}
