//! Tests that run the compiled `etch` binary against local bundles.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use etch_test_utils::{CommandBuilder, SpecBuilder, TestHost};
use predicates::prelude::*;

fn etch_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("etch"));
    cmd.env_remove("ETCH_SERVER").env_remove("ETCH_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// `etch` wired to the host's base dir and test root, using `bundles/`.
fn host_cmd(host: &TestHost) -> Command {
    let mut cmd = etch_cmd();
    cmd.arg("--config")
        .arg(host.path().join("etch.toml"))
        .arg("--local")
        .arg(host.path().join("bundles"))
        .arg("--base-dir")
        .arg(host.base_dir())
        .arg("--test-root")
        .arg(host.test_root());
    cmd
}

fn write_bundle(dir: &Path, bundle: serde_json::Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("bundle.json"), serde_json::to_string_pretty(&bundle).unwrap()).unwrap();
}

fn motd_bundle(host: &TestHost) {
    let spec = SpecBuilder::file("/etc/motd", "hello\n").perms("0644").build();
    let command = CommandBuilder::new("reload").step("", "true").build();
    write_bundle(
        &host.path().join("bundles"),
        serde_json::json!({ "resources": [spec], "commands": [command] }),
    );
}

#[test]
fn test_help_output() {
    etch_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--override-disable"));
}

#[test]
fn test_version_flag() {
    etch_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("etch"));
}

#[test]
fn test_local_run_applies_configuration() {
    let host = TestHost::new();
    host.write("/etc/motd", "old\n");
    motd_bundle(&host);

    host_cmd(&host)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("2 processed, 0 failed"));

    assert_eq!(host.read("/etc/motd"), "hello\n");
    assert_eq!(host.mode("/etc/motd"), 0o644);
    assert_eq!(fs::read_to_string(host.state("orig/etc/motd.ORIG")).unwrap(), "old\n");
}

#[test]
fn test_explicit_target_limits_the_run() {
    let host = TestHost::new();
    motd_bundle(&host);

    host_cmd(&host)
        .args(["--command", "reload"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("1 processed, 0 failed"));

    assert!(!host.exists("/etc/motd"));
}

#[test]
fn test_dry_run_shows_diff_without_changes() {
    let host = TestHost::new();
    host.write("/etc/motd", "old\n");
    motd_bundle(&host);

    host_cmd(&host)
        .arg("--dry-run")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("+hello"))
        .stdout(predicate::str::contains("DRY RUN"));

    assert_eq!(host.read("/etc/motd"), "old\n");
    assert!(!host.state("orig/etc/motd.ORIG").exists());
}

#[test]
fn test_disabled_agent_exits_200() {
    let host = TestHost::new();
    motd_bundle(&host);
    host.disable("kernel upgrade in progress");

    host_cmd(&host)
        .assert()
        .code(200)
        .stdout(predicate::str::contains("kernel upgrade in progress"));
    assert!(!host.exists("/etc/motd"));

    host_cmd(&host).arg("--override-disable").assert().code(0);
    assert!(host.exists("/etc/motd"));
}

#[test]
fn test_failed_resource_exits_1() {
    let host = TestHost::new();
    let spec = SpecBuilder::file("/etc/broken", "x").setup("exit 1").build();
    write_bundle(&host.path().join("bundles"), serde_json::json!({ "resources": [spec] }));

    host_cmd(&host)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("/etc/broken"))
        .stdout(predicate::str::contains("1 processed, 1 failed"));
}

#[test]
fn test_list_resources() {
    let host = TestHost::new();
    motd_bundle(&host);

    host_cmd(&host)
        .arg("--list-resources")
        .assert()
        .success()
        .stdout(predicate::str::contains("/etc/motd"))
        .stdout(predicate::str::contains("reload"));

    assert!(!host.exists("/etc/motd"));
}

#[test]
fn test_missing_authority_is_reported() {
    let host = TestHost::new();

    etch_cmd()
        .arg("--config")
        .arg(host.path().join("etch.toml"))
        .arg("--base-dir")
        .arg(host.base_dir())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No authority configured"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let host = TestHost::new();
    fs::write(host.path().join("etch.toml"), "server = [unclosed").unwrap();

    host_cmd(&host)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_results_file_receives_json_lines() {
    let host = TestHost::new();
    motd_bundle(&host);
    let results = host.path().join("results.jsonl");
    fs::write(
        host.path().join("etch.toml"),
        format!("detailed_results = [\"{}\"]\n", results.display()),
    )
    .unwrap();

    host_cmd(&host).assert().code(0);

    let text = fs::read_to_string(results).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("\"file\":\"/etc/motd\""), "{text}");
}
