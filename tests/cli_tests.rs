//! Exit codes and output of the `dupesift` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn dupesift(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dupesift"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run dupesift")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_duplicates_found_exit_zero() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("invoice.pdf");
    let b = dir.path().join("scan_0001.pdf");
    fs::write(&a, b"%PDF same bytes").unwrap();
    fs::write(&b, b"%PDF same bytes").unwrap();

    let output = dupesift(&["-q", "--output", "json", path_str(&a), path_str(&b)]);
    assert_eq!(output.status.code(), Some(0));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["groups"].as_array().unwrap().len(), 1);
    assert_eq!(json["groups"][0]["method"], "exact");
    assert_eq!(json["summary"]["exit_code_name"], "DS000");
}

#[test]
fn test_no_duplicates_exit_two() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("alpha.txt");
    let b = dir.path().join("omega.txt");
    fs::write(&a, b"first").unwrap();
    fs::write(&b, b"second").unwrap();

    let output = dupesift(&["-q", path_str(&a), path_str(&b)]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0 groups among 2 files"));
}

#[test]
fn test_unreadable_input_exit_three() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("one.bin");
    let b = dir.path().join("two.bin");
    fs::write(&a, b"payload").unwrap();
    fs::write(&b, b"payload").unwrap();
    let missing = dir.path().join("missing.bin");

    let output = dupesift(&["-q", path_str(&a), path_str(&missing), path_str(&b)]);
    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[exact]"));
}

#[test]
fn test_missing_config_exit_one() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    fs::write(&a, b"x").unwrap();
    let config = dir.path().join("nope.toml");

    let output = dupesift(&["--config", path_str(&config), path_str(&a)]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[DS001]"));
    assert!(stderr.contains("Config file not found"));
}

#[test]
fn test_json_errors() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    fs::write(&a, b"x").unwrap();

    let output = dupesift(&["-q", "--json-errors", "--grid-size", "40", path_str(&a)]);
    assert_eq!(output.status.code(), Some(1));

    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["code"], "DS001");
    assert_eq!(err["exit_code"], 1);
    assert_eq!(err["interrupted"], false);
    assert!(err["message"].as_str().unwrap().contains("grid_size"));
}

#[test]
fn test_print_config() {
    let output = dupesift(&["--print-config", "--hamming-threshold", "6"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hamming_threshold = 6"));
    assert!(stdout.contains("block_size = 65536"));
}

#[test]
fn test_missing_files_argument_is_usage_error() {
    let output = dupesift(&[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!output.stderr.is_empty());
}
