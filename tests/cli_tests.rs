// CLI tests for the capture-workflow binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("capture-workflow").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("guidance"));
}

#[test]
fn test_guidance_walks_table() {
    let mut cmd = Command::cargo_bin("capture-workflow").unwrap();

    cmd.args([
        "guidance",
        "--from",
        "first-segment-complete",
        "continue:false",
        "continue",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains(
        "continue:false -> flipping-object-not-recommended",
    ))
    .stdout(predicate::str::contains("-> capture-from-lower-angle"))
    .stdout(predicate::str::contains("Accepts: finish"));
}

#[test]
fn test_guidance_rejects_missing_edge() {
    let mut cmd = Command::cargo_bin("capture-workflow").unwrap();

    cmd.args(["guidance", "--from", "third-segment-complete", "continue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no transition"));
}

#[test]
fn test_guidance_rejects_unknown_state() {
    let mut cmd = Command::cargo_bin("capture-workflow").unwrap();

    cmd.args(["guidance", "--from", "fourth-segment"])
        .assert()
        .failure();
}

#[test]
fn test_simulate_prints_lifecycle() {
    let scans = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("capture-workflow").unwrap();

    cmd.current_dir(scans.path())
        .args(["simulate", "--flippable", "--scans-root"])
        .arg(scans.path().join("Scans"))
        .assert()
        .success()
        .stdout(predicate::str::contains("guidance starts at first-segment-complete"))
        .stdout(predicate::str::contains("-> reconstructing"))
        .stdout(predicate::str::contains("-> viewing"))
        .stdout(predicate::str::contains("-> completed"));
}

#[test]
fn test_simulate_cancel_first_restarts() {
    let scans = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("capture-workflow").unwrap();

    cmd.current_dir(scans.path())
        .args(["simulate", "--cancel-first", "--passes", "1", "--scans-root"])
        .arg(scans.path().join("Scans"))
        .assert()
        .success()
        .stdout(predicate::str::contains("-> restart"));
}
