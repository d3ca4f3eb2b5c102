//! CLI regression tests for the `pushgate` binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn pushgate() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("pushgate").expect("pushgate binary not found")
}

fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("pushgate.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn write_script(dir: &Path, name: &str, source: &str) {
    std::fs::write(dir.join(name), source).unwrap();
}

#[test]
fn check_valid_config_exits_zero() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "github.lua", "return 201, ctx:env('x')");
    let config = write_config(
        &dir,
        r#"
webhooks:
  - name: github
    file: github.lua
    env:
      x: "123"
  - name: inline
    script: "return 200"
"#,
    );

    pushgate()
        .args(["check", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("✓ github"))
        .stdout(contains("✓ inline"));
}

#[test]
fn check_syntax_error_exits_one() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "broken.lua", "return (");
    let config = write_config(
        &dir,
        r#"
webhooks:
  - name: broken
    file: broken.lua
"#,
    );

    pushgate()
        .args(["check", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stdout(contains("✗ broken"));
}

#[test]
fn check_reports_rejected_records() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
webhooks:
  - file: nameless.lua
"#,
    );

    pushgate()
        .args(["check", "--format", "json", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stdout(contains("\"valid\": false"))
        .stdout(contains("missing 'name'"));
}

#[test]
fn check_missing_config_exits_one() {
    pushgate()
        .args(["check", "--config", "this-file-does-not-exist.yaml"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("failed to read config"));
}

#[test]
fn serve_rejects_bad_listen_address() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "webhooks: []\n");

    pushgate()
        .args(["serve", "--listen", "not-an-address", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid listen address"));
}
