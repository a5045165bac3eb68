//! Tests for the kestrel binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::net::TcpListener;

/// Address of a local port nothing listens on
fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

fn kestrel() -> Command {
    let mut command = Command::cargo_bin("kestrel").unwrap();
    command
        .env_remove("KESTREL_CONFIG")
        .env_remove("KESTREL_SERVERS")
        .env_remove("RUST_LOG");
    command
}

#[test]
fn test_help_lists_commands() {
    kestrel()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("flush"))
        .stdout(predicate::str::contains("queues"));
}

#[test]
fn test_missing_servers_is_an_argument_error() {
    kestrel()
        .args(["get", "jobs"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn test_unknown_config_file() {
    kestrel()
        .args(["--config", "/nonexistent/kestrel.yaml", "queues"])
        .assert()
        .code(3);
}

#[test]
fn test_unreachable_server_fails_writes() {
    kestrel()
        .args(["--servers", &closed_address(), "set", "jobs", "payload"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Queue error"));
}

#[test]
fn test_invalid_key_is_rejected() {
    kestrel()
        .args(["--servers", &closed_address(), "get", "jobs/open"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid queue key"));
}
