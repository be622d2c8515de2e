//! Basic CLI tests for the lha command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;

fn lha() -> Command {
    let mut cmd = Command::cargo_bin("lha").unwrap();
    for var in [
        "LHA_CONFIG",
        "LHA_JWT_SECRET",
        "LHA_TRANSPORT",
        "LHA_PORT",
        "LHA_HOST",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_help() {
    lha()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("token"))
        .stdout(predicate::str::contains("targets"));
}

#[test]
fn test_cli_version() {
    lha()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lha"));
}

#[test]
fn test_no_subcommand_shows_error() {
    lha().assert().failure();
}

#[test]
fn test_serve_without_secret_fails_fast() {
    lha()
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("LHA_JWT_SECRET"));
}

#[test]
fn test_token_prints_three_segment_jwt() {
    let output = lha()
        .env("LHA_JWT_SECRET", "cli-secret")
        .args(["token", "--user", "danijel"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.trim().split('.').count(), 3);
}

#[test]
fn test_token_requires_user() {
    lha()
        .env("LHA_JWT_SECRET", "cli-secret")
        .arg("token")
        .assert()
        .failure();
}

#[test]
fn test_targets_lists_defaults() {
    lha()
        .arg("targets")
        .assert()
        .success()
        .stdout(predicate::str::contains("transport: mqtt"))
        .stdout(predicate::str::contains("left"))
        .stdout(predicate::str::contains("mqtt://lha/gate/rpc"));
}

#[test]
fn test_targets_in_http_mode_needs_urls() {
    lha()
        .env("LHA_TRANSPORT", "http")
        .arg("targets")
        .assert()
        .failure()
        .stderr(predicate::str::contains("url"));
}

#[test]
fn test_missing_config_file_is_reported() {
    lha()
        .args(["targets", "--config", "/nonexistent/lha.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/lha.toml"));
}
