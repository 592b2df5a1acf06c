use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Helper: get a Command for the flowcap binary with an isolated config dir.
fn flowcap(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("flowcap").expect("flowcap binary not found");
    cmd.env("FLOWCAP_CONFIG_DIR", config_dir.to_str().unwrap());
    cmd.env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn test_cp_help_lists_limit_flags() {
    let iso = TempDir::new().unwrap();
    flowcap(iso.path())
        .args(["cp", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--read-limit"))
        .stdout(predicate::str::contains("--write-limit-global"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_top_level_help_lists_commands() {
    let iso = TempDir::new().unwrap();
    flowcap(iso.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cp"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("fetch"));
}

// ============================================================================
// Copy
// ============================================================================

#[test]
fn test_unlimited_copy() {
    let iso = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.txt");
    let dest = dir.path().join("dest.txt");
    fs::write(&source, "hello flowcap").unwrap();

    flowcap(iso.path())
        .args(["-q", "cp", source.to_str().unwrap(), dest.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&dest).unwrap(), "hello flowcap");
}

#[test]
fn test_limited_copy_takes_time() {
    let iso = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.bin");
    let dest = dir.path().join("dest.bin");
    fs::write(&source, vec![b'-'; 50 * 1024]).unwrap();

    let start = Instant::now();
    flowcap(iso.path())
        .args([
            "cp",
            source.to_str().unwrap(),
            dest.to_str().unwrap(),
            "--write-limit",
            "100KiB/s",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Completed:"));

    assert!(start.elapsed() >= Duration::from_millis(450));
    assert_eq!(fs::metadata(&dest).unwrap().len(), 50 * 1024);
}

#[test]
fn test_limit_from_config_file() {
    let iso = TempDir::new().unwrap();
    fs::write(iso.path().join("config.toml"), "read_speed_limit = \"100KiB/s\"\n").unwrap();
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.bin");
    let dest = dir.path().join("dest.bin");
    fs::write(&source, vec![b'-'; 50 * 1024]).unwrap();

    let start = Instant::now();
    flowcap(iso.path())
        .args(["-q", "cp", source.to_str().unwrap(), dest.to_str().unwrap()])
        .assert()
        .success();

    assert!(start.elapsed() >= Duration::from_millis(450));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_source_not_found() {
    let iso = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("dest.txt");

    flowcap(iso.path())
        .args([
            "cp",
            dir.path().join("nonexistent.txt").to_str().unwrap(),
            dest.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Source not found"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_invalid_limit_flag() {
    let iso = TempDir::new().unwrap();
    flowcap(iso.path())
        .args(["cp", "a", "b", "--read-limit", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("greater than 0"));
}

#[test]
fn test_negative_limit_in_config_file() {
    let iso = TempDir::new().unwrap();
    fs::write(iso.path().join("config.toml"), "write_speed_limit = -1\n").unwrap();

    flowcap(iso.path())
        .args(["cp", "a", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"))
        .stderr(predicate::str::contains("negative"));
}
