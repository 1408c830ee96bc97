//! CLI integration tests for khidma
//!
//! Tests the khidma CLI commands end-to-end using assert_cmd. Each
//! test points KHIDMA_DATA_DIR and KHIDMA_CONFIG_DIR at its own temp
//! directory so runs never share state.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a command with isolated data and config dirs
fn khidma_cmd(dirs: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("khidma").unwrap();
    cmd.env("KHIDMA_DATA_DIR", dirs.path().join("data"));
    cmd.env("KHIDMA_CONFIG_DIR", dirs.path().join("config"));
    cmd
}

/// Seed demo data and pull the printed ids out of the output
fn seed(dirs: &TempDir) -> (String, String, String) {
    let output = khidma_cmd(dirs).arg("seed").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    let grab = |label: &str| {
        stdout
            .lines()
            .find(|l| l.trim_start().starts_with(label))
            .and_then(|l| l.split_whitespace().nth(1))
            .map(String::from)
            .unwrap_or_else(|| panic!("seed output missing {}", label))
    };
    (grab("client:"), grab("provider:"), grab("service:"))
}

#[test]
fn test_db_init_and_status() {
    let dirs = TempDir::new().unwrap();

    khidma_cmd(&dirs)
        .args(["db", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Database ready"));

    khidma_cmd(&dirs)
        .args(["db", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("schema version 2 of 2"));
}

#[test]
fn test_seed_prints_next_steps() {
    let dirs = TempDir::new().unwrap();

    khidma_cmd(&dirs)
        .arg("seed")
        .assert()
        .success()
        .stdout(predicate::str::contains("Seeded demo data"))
        .stdout(predicate::str::contains("khidma open --as"));
}

#[test]
fn test_open_send_and_list_flow() {
    let dirs = TempDir::new().unwrap();
    let (client, provider, service) = seed(&dirs);

    let output = khidma_cmd(&dirs)
        .args(["--quiet", "open", "--as", &client, &service, &provider])
        .output()
        .unwrap();
    assert!(output.status.success());
    let conversation = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert!(!conversation.is_empty());

    khidma_cmd(&dirs)
        .args(["send", "--as", &client, &conversation, "مرحبا"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sent"));

    // Recipient sees one unread
    khidma_cmd(&dirs)
        .args(["unread", "--as", &provider])
        .assert()
        .success()
        .stdout(predicate::str::contains("1"));

    // Listing with --mark-read clears it
    khidma_cmd(&dirs)
        .args(["messages", "--as", &provider, &conversation, "--mark-read"])
        .assert()
        .success()
        .stdout(predicate::str::contains("مرحبا"));

    khidma_cmd(&dirs)
        .args(["unread", "--as", &provider])
        .assert()
        .success()
        .stdout(predicate::str::contains("0"));
}

#[test]
fn test_conversations_shows_counterpart_and_service() {
    let dirs = TempDir::new().unwrap();
    let (client, provider, service) = seed(&dirs);

    khidma_cmd(&dirs)
        .args(["--quiet", "open", "--as", &client, &service, &provider])
        .assert()
        .success();

    khidma_cmd(&dirs)
        .args(["conversations", "--as", &client])
        .assert()
        .success()
        .stdout(predicate::str::contains("فاطمة"))
        .stdout(predicate::str::contains("تصميم شعار"));
}

#[test]
fn test_open_rejects_unknown_user() {
    let dirs = TempDir::new().unwrap();
    khidma_cmd(&dirs)
        .args(["db", "init"])
        .assert()
        .success();

    khidma_cmd(&dirs)
        .args(["open", "--as", "nobody", "svc", "prov"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown user"));
}

#[test]
fn test_set_status_round_trip() {
    let dirs = TempDir::new().unwrap();
    let (client, provider, service) = seed(&dirs);

    let output = khidma_cmd(&dirs)
        .args(["--quiet", "open", "--as", &client, &service, &provider])
        .output()
        .unwrap();
    let conversation = String::from_utf8(output.stdout).unwrap().trim().to_string();

    khidma_cmd(&dirs)
        .args(["set-status", "--as", &client, &conversation, "archived"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archived"));

    khidma_cmd(&dirs)
        .args(["set-status", "--as", &client, &conversation, "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid status"));
}

#[test]
fn test_config_get_and_set() {
    let dirs = TempDir::new().unwrap();

    khidma_cmd(&dirs)
        .args(["config", "get", "chat.unread_poll_secs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("30"));

    khidma_cmd(&dirs)
        .args(["config", "set", "chat.unread_poll_secs", "10"])
        .assert()
        .success();

    khidma_cmd(&dirs)
        .args(["config", "get", "chat.unread_poll_secs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10"));
}

#[test]
fn test_json_output_is_parseable() {
    let dirs = TempDir::new().unwrap();
    let (client, provider, service) = seed(&dirs);

    let output = khidma_cmd(&dirs)
        .args(["--format", "json", "open", "--as", &client, &service, &provider])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "active");
    assert_eq!(value["client_id"], client.as_str());
}