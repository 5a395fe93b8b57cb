//! CLI integration tests for the Soliplex command-line interface.
//!
//! Each test builds a small installation in a temporary directory and runs
//! the binary against it.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the soliplex binary with a clean installation env.
fn soliplex() -> Command {
    let mut cmd = Command::cargo_bin("soliplex").unwrap();
    cmd.env_remove("SOLIPLEX_INSTALLATION_PATH");
    cmd
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn installation() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("installation.yaml"),
        r#"
id: cli-test
secrets:
  - SOLIPLEX_TEST_PRESENT
  - SOLIPLEX_TEST_ABSENT
environment:
  GREETING: hello
  SOLIPLEX_TEST_HOST: null
"#,
    );
    write(
        &dir.path().join("rooms/lobby/room_config.yaml"),
        "id: lobby\nname: Lobby\ndescription: Entry\n_order: b\nagent: {}\n",
    );
    write(
        &dir.path().join("rooms/annex/room_config.yaml"),
        "id: annex\nname: Annex\ndescription: Side\n_order: a\nagent: {}\n",
    );
    write(
        &dir.path().join("completions/ask/completion_config.yaml"),
        "id: ask\nagent: {}\n",
    );
    dir
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Argument Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    soliplex()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check-config"))
        .stdout(predicate::str::contains("list-secrets"))
        .stdout(predicate::str::contains("list-environment"))
        .stdout(predicate::str::contains("list-rooms"))
        .stdout(predicate::str::contains("list-completions"))
        .stdout(predicate::str::contains("list-oidc"));
}

#[test]
fn test_version_displays() {
    soliplex()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("soliplex"));
}

#[test]
fn test_missing_installation_path() {
    soliplex()
        .arg("list-secrets")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Installation path not found"));
}

#[test]
fn test_nonexistent_installation() {
    let dir = TempDir::new().unwrap();
    soliplex()
        .args(["-c"])
        .arg(dir.path())
        .arg("list-rooms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("installation.yaml"));
}

// ─────────────────────────────────────────────────────────────────────────────
// check-config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_check_config_reports_everything_missing() {
    let dir = installation();
    soliplex()
        .env("SOLIPLEX_TEST_PRESENT", "yes")
        .env_remove("SOLIPLEX_TEST_ABSENT")
        .env_remove("SOLIPLEX_TEST_HOST")
        .arg("-c")
        .arg(dir.path())
        .arg("check-config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Missing secrets"))
        .stdout(predicate::str::contains("- SOLIPLEX_TEST_ABSENT"))
        .stdout(predicate::str::contains("Missing environment variables"))
        .stdout(predicate::str::contains("- SOLIPLEX_TEST_HOST"))
        .stdout(predicate::str::contains("SOLIPLEX_TEST_PRESENT").not());
}

#[test]
fn test_check_config_ok() {
    let dir = installation();
    soliplex()
        .env("SOLIPLEX_TEST_PRESENT", "yes")
        .env("SOLIPLEX_TEST_ABSENT", "now-present")
        .env("SOLIPLEX_TEST_HOST", "localhost")
        .arg("-c")
        .arg(dir.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Secrets: OK"))
        .stdout(predicate::str::contains("Environment variables: OK"));
}

#[test]
fn test_check_config_json() {
    let dir = installation();
    let output = soliplex()
        .env("SOLIPLEX_TEST_PRESENT", "yes")
        .env_remove("SOLIPLEX_TEST_ABSENT")
        .env("SOLIPLEX_TEST_HOST", "localhost")
        .arg("--json")
        .arg("-c")
        .arg(dir.path())
        .arg("check-config")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["missing_secrets"], serde_json::json!(["SOLIPLEX_TEST_ABSENT"]));
    assert_eq!(json["missing_environment"], serde_json::json!([]));
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_list_secrets() {
    let dir = installation();
    soliplex()
        .env("SOLIPLEX_INSTALLATION_PATH", dir.path())
        .arg("list-secrets")
        .assert()
        .success()
        .stdout(predicate::str::contains("- SOLIPLEX_TEST_PRESENT"))
        .stdout(predicate::str::contains("- SOLIPLEX_TEST_ABSENT"));
}

#[test]
fn test_list_environment() {
    let dir = installation();
    soliplex()
        .arg("-c")
        .arg(dir.path())
        .arg("list-environment")
        .assert()
        .success()
        .stdout(predicate::str::contains("- GREETING: hello"))
        .stdout(predicate::str::contains("- SOLIPLEX_TEST_HOST"));
}

#[test]
fn test_list_rooms_sorted_by_order() {
    let dir = installation();
    let output = soliplex()
        .arg("-c")
        .arg(dir.path())
        .arg("list-rooms")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let annex = stdout.find("- annex").unwrap();
    let lobby = stdout.find("- lobby").unwrap();
    assert!(annex < lobby);
}

#[test]
fn test_list_rooms_json() {
    let dir = installation();
    let output = soliplex()
        .args(["--json", "-c"])
        .arg(dir.path())
        .arg("list-rooms")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json[0]["id"], "annex");
    assert_eq!(json[1]["agent_id"], "room-lobby");
}

#[test]
fn test_list_completions() {
    let dir = installation();
    soliplex()
        .arg("-c")
        .arg(dir.path())
        .arg("list-completions")
        .assert()
        .success()
        .stdout(predicate::str::contains("- ask: ask"));
}

#[test]
fn test_list_oidc_without_systems() {
    let dir = installation();
    soliplex()
        .arg("-c")
        .arg(dir.path())
        .arg("list-oidc")
        .assert()
        .success()
        .stdout(predicate::str::contains("authentication disabled"));
}
