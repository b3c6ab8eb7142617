//! End-to-end scenarios across the agent crates.
//!
//! Each test builds an isolated host (state directory plus a test root that
//! stands in for `/`), serves configuration from local bundles or a scripted
//! authority, and checks the live filesystem and the archive afterwards.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use etch_core::{AgentConfig, Archive, EXIT_FAILURE, EXIT_SUCCESS, RunOptions, RunSummary, Session};
use etch_fs::{LockManager, meta};
use etch_protocol::{Facts, LocalResolver, Resolver};
use etch_test_utils::{ScriptedResolver, SpecBuilder, TestHost};
use pretty_assertions::assert_eq;
use rstest::rstest;

// =============================================================================
// Test Infrastructure
// =============================================================================

fn config(host: &TestHost) -> AgentConfig {
    AgentConfig {
        base_dir: host.base_dir(),
        test_root: Some(host.test_root()),
        lock_attempts: 3,
        lock_interval_secs: 0,
        capture_timeout_secs: 30,
        ..AgentConfig::default()
    }
}

fn run_with(config: &AgentConfig, resolver: &dyn Resolver, options: RunOptions) -> RunSummary {
    Session::new(config, resolver, Facts::new().with("fqdn", "web1.example.com"), options)
        .run()
        .unwrap()
}

fn run(host: &TestHost, resolver: &dyn Resolver) -> RunSummary {
    run_with(&config(host), resolver, RunOptions::default())
}

fn write_bundle(dir: &Path, name: &str, toml: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), toml).unwrap();
}

// =============================================================================
// Scenarios
// =============================================================================

/// `/etc/motd` replaced from a TOML bundle; the original lands in the archive.
#[test]
fn test_motd_from_local_bundle() {
    let host = TestHost::new();
    host.write("/etc/motd", "old\n");
    let bundles = host.path().join("bundles");
    write_bundle(
        &bundles,
        "motd.toml",
        &format!(
            r#"
[[resources]]
name = "/etc/motd"
[resources.action]
type = "file"
perms = "0644"
owner = "{}"
contents = "aGVsbG8K"
"#,
            host.uid()
        ),
    );
    let resolver = LocalResolver::load(&bundles).unwrap();

    let summary = run(&host, &resolver);

    assert_eq!(summary.status, EXIT_SUCCESS);
    assert_eq!(
        fs::read_to_string(host.state("orig/etc/motd.ORIG")).unwrap(),
        "old\n"
    );
    assert_eq!(host.read("/etc/motd"), "hello\n");
    assert_eq!(host.mode("/etc/motd"), 0o644);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].file, "/etc/motd");
    assert!(summary.results[0].success);
}

/// A second run over matching state mutates nothing and reports no changes.
#[rstest]
#[case::file(SpecBuilder::file("/etc/hosts", "127.0.0.1 localhost\n").perms("0644"))]
#[case::link(SpecBuilder::link("/etc/localtime", "/usr/share/zoneinfo/UTC"))]
#[case::directory(SpecBuilder::directory("/etc/app.d").perms("0750"))]
#[case::delete(SpecBuilder::delete("/etc/cron.d/legacy"))]
fn test_converged_resources_are_untouched(#[case] spec: SpecBuilder) {
    let host = TestHost::new();
    host.write("/usr/share/zoneinfo/UTC", "TZif");
    host.write("/etc/cron.d/legacy", "* * * * * root true\n");
    let spec = spec.owner(&host.uid()).build();
    let resolver = ScriptedResolver::new().resource(spec.clone());

    let first = run(&host, &resolver);
    assert_eq!(first.status, EXIT_SUCCESS, "{:?}", first.results);
    let live = host.live(&spec.name);
    let before = meta::probe(&live).unwrap();

    let second = run(&host, &resolver);

    assert_eq!(second.status, EXIT_SUCCESS);
    assert_eq!(second.results.len(), 1);
    assert!(second.results[0].success);
    assert_eq!(second.results[0].message, "");
    assert_eq!(meta::probe(&live).unwrap(), before);
}

/// The archive keeps serving the pre-etch content after later changes.
#[test]
fn test_original_survives_successive_changes() {
    let host = TestHost::new();
    host.write("/etc/ntp.conf", "server pool.ntp.org\n");
    let config = config(&host);

    for version in ["server a.example\n", "server b.example\n"] {
        let resolver = ScriptedResolver::new().resource(SpecBuilder::file("/etc/ntp.conf", version).build());
        assert_eq!(run_with(&config, &resolver, RunOptions::default()).status, EXIT_SUCCESS);
        assert_eq!(host.read("/etc/ntp.conf"), version);
    }

    let archive = Archive::new(&host.layout());
    let original = archive
        .contents("/etc/ntp.conf", &host.live("/etc/ntp.conf"))
        .unwrap();
    assert_eq!(original, b"server pool.ntp.org\n");
}

/// A failing test restores the exact prior state and runs post twice.
#[test]
fn test_failed_test_restores_prior_state_exactly() {
    let host = TestHost::new();
    host.write("/etc/sshd_config", "PermitRootLogin no\n");
    host.set_mode("/etc/sshd_config", 0o600);
    let live = host.live("/etc/sshd_config");
    let before = meta::probe(&live).unwrap();
    let before_content = fs::read(&live).unwrap();
    let post = host.marker_command("post.log", "reload sshd");
    let resolver = ScriptedResolver::new().resource(
        SpecBuilder::file("/etc/sshd_config", "PermitRootLogin yes\n")
            .perms("0644")
            .post(&post)
            .test(&format!("grep -q 'no$' {}", live.display()))
            .build(),
    );

    let summary = run(&host, &resolver);

    assert_eq!(fs::read(&live).unwrap(), before_content);
    let after = meta::probe(&live).unwrap();
    assert_eq!(after.mode, before.mode);
    assert_eq!((after.uid, after.gid), (before.uid, before.gid));
    assert_eq!(host.marker_lines("post.log"), vec!["reload sshd", "reload sshd"]);
    assert!(summary.results[0].message.contains("rolling back"));
}

/// A live lock holds out for the whole retry budget, then the item fails.
#[test]
fn test_live_lock_exhausts_retry_budget() {
    let host = TestHost::new();
    let layout = host.layout();
    layout.ensure().unwrap();
    let _held = LockManager::new(layout.locks_dir()).acquire("/etc/motd").unwrap();
    let resolver = ScriptedResolver::new().resource(SpecBuilder::file("/etc/motd", "hello\n").build());

    let summary = run(&host, &resolver);

    assert_eq!(summary.status, EXIT_FAILURE);
    assert!(
        summary.results[0].message.contains("after 3 attempts"),
        "{}",
        summary.results[0].message
    );
    assert!(!host.exists("/etc/motd"));
}

/// Lock files older than the staleness threshold go away without force.
#[test]
fn test_stale_lock_is_removed_at_start() {
    let host = TestHost::new();
    let layout = host.layout();
    layout.ensure().unwrap();
    let abandoned = LockManager::new(layout.locks_dir()).acquire("/etc/motd").unwrap();
    std::mem::forget(abandoned);
    thread::sleep(Duration::from_millis(1100));
    let config = AgentConfig {
        stale_lock_secs: 1,
        ..config(&host)
    };
    let resolver = ScriptedResolver::new().resource(SpecBuilder::file("/etc/motd", "hello\n").build());

    let summary = run_with(&config, &resolver, RunOptions::default());

    assert_eq!(summary.status, EXIT_SUCCESS);
    assert_eq!(host.read("/etc/motd"), "hello\n");
}

/// Creating a file that did not exist, then reverting, leaves no trace.
#[test]
fn test_absent_original_round_trip() {
    let host = TestHost::new();
    let config = config(&host);
    let create = ScriptedResolver::new().resource(SpecBuilder::file("/etc/profile.d/etch.sh", "export A=1\n").build());
    assert_eq!(run_with(&config, &create, RunOptions::default()).status, EXIT_SUCCESS);
    assert!(host.state("orig/etc/profile.d/etch.sh.NOORIG").exists());

    let revert = ScriptedResolver::new().resource(SpecBuilder::revert("/etc/profile.d/etch.sh").build());
    let summary = run_with(&config, &revert, RunOptions::default());

    assert_eq!(summary.status, EXIT_SUCCESS);
    assert!(!host.exists("/etc/profile.d/etch.sh"));
    assert!(!host.state("orig/etc/profile.d/etch.sh.NOORIG").exists());

    // Untouched again: nothing left to revert
    let again = run_with(&config, &revert, RunOptions::default());
    assert_eq!(again.status, EXIT_SUCCESS);
    assert_eq!(again.results[0].message, "");
}

/// Reverting a replaced file brings the original content and mode back.
#[test]
fn test_revert_restores_replaced_file() {
    let host = TestHost::new();
    host.write("/etc/issue", "Welcome\n");
    host.set_mode("/etc/issue", 0o640);
    let config = config(&host);
    let manage = ScriptedResolver::new().resource(SpecBuilder::file("/etc/issue", "Managed\n").perms("0644").build());
    run_with(&config, &manage, RunOptions::default());
    assert_eq!(host.read("/etc/issue"), "Managed\n");

    let revert = ScriptedResolver::new().resource(SpecBuilder::revert("/etc/issue").build());
    run_with(&config, &revert, RunOptions::default());

    assert_eq!(host.read("/etc/issue"), "Welcome\n");
    assert_eq!(host.mode("/etc/issue"), 0o640);
    assert!(!host.state("orig/etc/issue.ORIG").exists());
}

/// A dependency whose setup fails stops its dependent before any change.
#[test]
fn test_failed_setup_blocks_dependent() {
    let host = TestHost::new();
    let resolver = ScriptedResolver::new()
        .resource(SpecBuilder::file("/etc/b.conf", "b").depend("/etc/a.conf").build())
        .resource(SpecBuilder::file("/etc/a.conf", "a").setup("exit 7").build());

    let summary = run(&host, &resolver);

    assert_eq!(summary.status, EXIT_FAILURE);
    assert!(!host.exists("/etc/a.conf"));
    assert!(!host.exists("/etc/b.conf"));
    let a = summary.results.iter().find(|r| r.file == "/etc/a.conf").unwrap();
    let b = summary.results.iter().find(|r| r.file == "/etc/b.conf").unwrap();
    assert!(!a.success);
    assert!(!b.success);
    assert!(b.message.contains("depends on /etc/a.conf"), "{}", b.message);
}

/// Replacing a directory needs explicit permission; with it, the old tree
/// is archived whole.
#[test]
fn test_directory_replacement_requires_overwrite() {
    let host = TestHost::new();
    host.write("/etc/app/conf.d/a.conf", "a\n");
    let config = config(&host);

    let refused = ScriptedResolver::new().resource(SpecBuilder::file("/etc/app/conf.d", "flat\n").build());
    let summary = run_with(&config, &refused, RunOptions::default());
    assert_eq!(summary.status, EXIT_FAILURE);
    assert!(host.live("/etc/app/conf.d").is_dir());

    let allowed = ScriptedResolver::new().resource(
        SpecBuilder::file("/etc/app/conf.d", "flat\n")
            .overwrite_directory()
            .build(),
    );
    let summary = run_with(&config, &allowed, RunOptions::default());
    assert_eq!(summary.status, EXIT_SUCCESS, "{:?}", summary.results);
    assert_eq!(host.read("/etc/app/conf.d"), "flat\n");
    assert!(host.state("orig/etc/app/conf.d.TAR").exists());
}

/// Links point at the mapped destination under the test root.
#[test]
fn test_link_to_mapped_destination() {
    let host = TestHost::new();
    host.write("/usr/share/zoneinfo/Europe/Berlin", "TZif");
    host.write("/etc/localtime", "old zone\n");
    let resolver = ScriptedResolver::new().resource(SpecBuilder::link("/etc/localtime", "/usr/share/zoneinfo/Europe/Berlin").build());

    let summary = run(&host, &resolver);

    assert_eq!(summary.status, EXIT_SUCCESS);
    let target = fs::read_link(host.live("/etc/localtime")).unwrap();
    assert_eq!(target, host.live("/usr/share/zoneinfo/Europe/Berlin"));
    assert_eq!(
        fs::read_to_string(host.state("orig/etc/localtime.ORIG")).unwrap(),
        "old zone\n"
    );
}
