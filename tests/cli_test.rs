//! CLI surface tests for the reference server binary
//!
//! The binary must fail fast (exit code 1, diagnostics on stderr) for bad
//! configuration, and keep stdout clean because it belongs to the
//! transport.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_unknown_transport_exits_nonzero_with_stderr_diagnostics() {
    Command::cargo_bin("mcpkit-server")
        .unwrap()
        .args(["--transport", "carrier-pigeon"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("carrier-pigeon"));
}

#[test]
fn test_bad_bind_address_exits_nonzero() {
    Command::cargo_bin("mcpkit-server")
        .unwrap()
        .args(["--transport", "sse", "--bind", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-an-address"));
}

#[test]
fn test_missing_config_file_exits_nonzero() {
    Command::cargo_bin("mcpkit-server")
        .unwrap()
        .args(["--config", "/nonexistent/mcpkit.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read config"));
}

#[test]
fn test_help_mentions_transports() {
    Command::cargo_bin("mcpkit-server")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--transport"));
}
