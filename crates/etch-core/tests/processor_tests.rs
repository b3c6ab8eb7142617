//! State-machine tests for the dependency-aware processor.

use std::time::Duration;

use etch_core::processor::{Completion, ItemKey};
use etch_core::{
    Confirmation, Decision, Error, Executor, Outcome, Processor, Prompter, RunContext, RunMode,
};
use etch_fs::LockManager;
use etch_protocol::{CommandSpec, ResourceSpec};
use etch_test_utils::{CommandBuilder, SpecBuilder, TestHost};
use pretty_assertions::assert_eq;

fn processor(host: &TestHost, mode: RunMode) -> Processor {
    let layout = host.layout();
    layout.ensure().unwrap();
    let locks = LockManager::new(layout.locks_dir()).with_retry(2, Duration::ZERO);
    Processor::new(&layout, mode, Executor::new(mode, Duration::from_secs(30)), locks).unwrap()
}

fn round(resources: Vec<ResourceSpec>, commands: Vec<CommandSpec>) -> RunContext {
    let mut ctx = RunContext::new();
    ctx.begin_round(resources, commands, true);
    ctx
}

fn result_for<'a>(ctx: &'a RunContext, name: &str) -> Vec<&'a etch_protocol::ProcessingResult> {
    ctx.results().iter().filter(|r| r.file == name).collect()
}

struct Always(Decision);

impl Prompter for Always {
    fn confirm(&self, _request: &Confirmation<'_>) -> etch_core::Result<Decision> {
        Ok(self.0)
    }
}

#[test]
fn test_motd_is_replaced_and_original_archived() {
    let host = TestHost::new();
    host.write("/etc/motd", "old\n");
    let spec = SpecBuilder::file("/etc/motd", "hello\n")
        .perms("0644")
        .owner(&host.uid())
        .build();
    let mut ctx = round(vec![spec], vec![]);

    let outcome = processor(&host, RunMode::Normal)
        .process_resource(&mut ctx, "/etc/motd")
        .unwrap();

    assert_eq!(outcome, Outcome::Changed);
    assert_eq!(host.read("/etc/motd"), "hello\n");
    assert_eq!(host.mode("/etc/motd"), 0o644);
    assert_eq!(
        std::fs::read_to_string(host.state("orig/etc/motd.ORIG")).unwrap(),
        "old\n"
    );
    let results = result_for(&ctx, "/etc/motd");
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

#[test]
fn test_matching_resource_is_left_alone() {
    let host = TestHost::new();
    host.write("/etc/motd", "hello\n");
    host.set_mode("/etc/motd", 0o644);
    let marker = host.marker_command("post.log", "post");
    let spec = SpecBuilder::file("/etc/motd", "hello\n")
        .perms("0644")
        .owner(&host.uid())
        .group(&host.gid())
        .post(&marker)
        .build();
    let mut ctx = round(vec![spec], vec![]);

    let outcome = processor(&host, RunMode::Normal)
        .process_resource(&mut ctx, "/etc/motd")
        .unwrap();

    assert_eq!(outcome, Outcome::Unchanged);
    assert!(host.marker_lines("post.log").is_empty());
    assert!(!host.state("orig/etc/motd.ORIG").exists());
    assert!(result_for(&ctx, "/etc/motd")[0].success);
}

#[test]
fn test_diamond_dependency_is_processed_once() {
    let host = TestHost::new();
    let post = host.marker_command("post.log", "base");
    let specs = vec![
        SpecBuilder::file("/etc/top", "t").depend("/etc/left").depend("/etc/right").build(),
        SpecBuilder::file("/etc/left", "l").depend("/etc/base").build(),
        SpecBuilder::file("/etc/right", "r").depend("/etc/base").build(),
        SpecBuilder::file("/etc/base", "b").post(&post).build(),
    ];
    let mut ctx = round(specs, vec![]);
    let processor = processor(&host, RunMode::Normal);

    processor.process_resource(&mut ctx, "/etc/top").unwrap();
    // Already done as a dependency: a no-op now
    assert_eq!(
        processor.process_resource(&mut ctx, "/etc/base").unwrap(),
        Outcome::Unchanged
    );

    assert_eq!(host.marker_lines("post.log"), vec!["base"]);
    assert_eq!(result_for(&ctx, "/etc/base").len(), 1);
    assert_eq!(ctx.results().len(), 4);
    assert!(ctx.results().iter().all(|r| r.success));
}

#[test]
fn test_cycle_is_fatal_before_any_mutation() {
    let host = TestHost::new();
    let specs = vec![
        SpecBuilder::file("/etc/a", "a").depend("/etc/b").build(),
        SpecBuilder::file("/etc/b", "b").depend("/etc/a").build(),
    ];
    let mut ctx = round(specs, vec![]);

    let err = processor(&host, RunMode::Normal)
        .process_resource(&mut ctx, "/etc/a")
        .unwrap_err();

    assert!(matches!(err, Error::CircularDependency { .. }), "{err}");
    assert!(err.to_string().contains("/etc/a, /etc/b"), "{err}");
    assert!(!host.exists("/etc/a"));
    assert!(!host.exists("/etc/b"));
    assert!(!host.state("orig/etc/a.NOORIG").exists());
    for name in ["/etc/a", "/etc/b"] {
        let results = result_for(&ctx, name);
        assert_eq!(results.len(), 1, "{name}");
        assert!(!results[0].success);
        assert!(results[0].message.contains("Circular dependency"), "{}", results[0].message);
    }
}

#[test]
fn test_failed_setup_stops_dependents() {
    let host = TestHost::new();
    let pre = host.marker_command("pre.log", "dependent");
    let specs = vec![
        SpecBuilder::file("/etc/b", "b").depend("/etc/a").pre(&pre).build(),
        SpecBuilder::file("/etc/a", "a").setup("exit 1").build(),
    ];
    let mut ctx = round(specs, vec![]);

    let err = processor(&host, RunMode::Normal)
        .process_resource(&mut ctx, "/etc/b")
        .unwrap_err();

    assert!(matches!(err, Error::DependencyFailed { .. }), "{err}");
    assert!(!host.exists("/etc/a"));
    assert!(!host.exists("/etc/b"));
    assert!(host.marker_lines("pre.log").is_empty());
    assert_eq!(ctx.completion(&ItemKey::Resource("/etc/a".into())), Some(Completion::Failed));
    let a = result_for(&ctx, "/etc/a");
    assert!(!a[0].success);
    assert!(a[0].message.contains("setup command for /etc/a failed"), "{}", a[0].message);
}

#[test]
fn test_failed_test_rolls_back_and_reruns_post() {
    let host = TestHost::new();
    host.write("/etc/app.conf", "v1\n");
    host.set_mode("/etc/app.conf", 0o640);
    let post = host.marker_command("post.log", "post");
    let spec = SpecBuilder::file("/etc/app.conf", "v2\n")
        .perms("0644")
        .post(&post)
        .test("exit 1")
        .build();
    let mut ctx = round(vec![spec], vec![]);

    let outcome = processor(&host, RunMode::Normal)
        .process_resource(&mut ctx, "/etc/app.conf")
        .unwrap();

    assert_eq!(outcome, Outcome::RolledBack);
    assert_eq!(host.read("/etc/app.conf"), "v1\n");
    assert_eq!(host.mode("/etc/app.conf"), 0o640);
    assert_eq!(host.marker_lines("post.log"), vec!["post", "post"]);
    let result = result_for(&ctx, "/etc/app.conf")[0];
    assert!(result.success);
    assert!(result.message.contains("rolling back"), "{}", result.message);
}

#[test]
fn test_failed_test_before_post_rolls_back_without_post() {
    let host = TestHost::new();
    host.write("/etc/app.conf", "v1\n");
    let post = host.marker_command("post.log", "post");
    let spec = SpecBuilder::file("/etc/app.conf", "v2\n")
        .post(&post)
        .test_before_post("exit 1")
        .build();
    let mut ctx = round(vec![spec], vec![]);

    let err = processor(&host, RunMode::Normal)
        .process_resource(&mut ctx, "/etc/app.conf")
        .unwrap_err();

    assert!(matches!(err, Error::TestBeforePostFailed { .. }), "{err}");
    assert_eq!(host.read("/etc/app.conf"), "v1\n");
    assert!(host.marker_lines("post.log").is_empty());
}

#[test]
fn test_post_once_runs_only_on_first_change() {
    let host = TestHost::new();
    let once = host.marker_command("once.log", "once");
    let spec = SpecBuilder::file("/etc/issue", "managed\n").post_once(&once).build();
    let processor = processor(&host, RunMode::Normal);

    let mut ctx = round(vec![spec.clone()], vec![]);
    processor.process_resource(&mut ctx, "/etc/issue").unwrap();
    host.write("/etc/issue", "drifted\n");
    let mut ctx = round(vec![spec], vec![]);
    processor.process_resource(&mut ctx, "/etc/issue").unwrap();

    assert_eq!(host.read("/etc/issue"), "managed\n");
    assert_eq!(host.marker_lines("once.log"), vec!["once"]);
}

#[test]
fn test_post_once_runs_when_original_was_archived_earlier() {
    let host = TestHost::new();
    let live = host.write("/etc/issue", "stock\n");
    let once = host.marker_command("once.log", "once");
    let spec = SpecBuilder::file("/etc/issue", "managed\n").post_once(&once).build();
    let processor = processor(&host, RunMode::Normal);

    // The authority asked for the original before sending the configuration.
    assert_eq!(processor.archive().contents("/etc/issue", &live).unwrap(), b"stock\n");
    let mut ctx = round(vec![spec], vec![]);
    let outcome = processor.process_resource(&mut ctx, "/etc/issue").unwrap();

    assert_eq!(outcome, Outcome::Changed);
    assert_eq!(host.marker_lines("once.log"), vec!["once"]);
}

#[test]
fn test_once_per_run_commands_are_collected() {
    let host = TestHost::new();
    let reload = host.marker_command("reload.log", "reload");
    let specs = vec![
        SpecBuilder::file("/etc/a", "a").post_once_per_run(&reload).build(),
        SpecBuilder::file("/etc/b", "b").post_once_per_run(&reload).build(),
    ];
    let mut ctx = round(specs, vec![]);
    let processor = processor(&host, RunMode::Normal);

    processor.process_resource(&mut ctx, "/etc/a").unwrap();
    processor.process_resource(&mut ctx, "/etc/b").unwrap();

    assert_eq!(ctx.take_once_per_run(), vec![reload]);
    assert!(host.marker_lines("reload.log").is_empty());
}

#[test]
fn test_history_records_before_and_after() {
    let host = TestHost::new();
    host.write("/etc/motd", "old\n");
    let mut ctx = round(vec![SpecBuilder::file("/etc/motd", "hello\n").build()], vec![]);

    processor(&host, RunMode::Normal)
        .process_resource(&mut ctx, "/etc/motd")
        .unwrap();

    let entry = host.state("history/etc/motd.HISTORY");
    assert_eq!(std::fs::read_to_string(entry).unwrap(), "hello\n");
    assert!(host.state("history/RCS").is_dir());
}

#[test]
fn test_guarded_command_runs_until_guard_holds() {
    let host = TestHost::new();
    let flag = host.path().join("configured");
    let ran = host.marker_command("cmd.log", "ran");
    let command = CommandBuilder::new("configure")
        .step(
            &format!("test -f {}", flag.display()),
            &format!("{ran} && touch {}", flag.display()),
        )
        .build();
    let processor = processor(&host, RunMode::Normal);

    let mut ctx = round(vec![], vec![command.clone()]);
    assert_eq!(processor.process_command(&mut ctx, "configure").unwrap(), Outcome::Changed);
    let mut ctx = round(vec![], vec![command]);
    assert_eq!(processor.process_command(&mut ctx, "configure").unwrap(), Outcome::Unchanged);

    assert_eq!(host.marker_lines("cmd.log"), vec!["ran"]);
}

#[test]
fn test_guard_still_failing_is_fatal() {
    let host = TestHost::new();
    let command = CommandBuilder::new("broken").step("false", "true").build();
    let mut ctx = round(vec![], vec![command]);

    let err = processor(&host, RunMode::Normal)
        .process_command(&mut ctx, "broken")
        .unwrap_err();

    assert!(matches!(err, Error::GuardStillFailing { .. }), "{err}");
}

#[test]
fn test_command_file_dependencies_are_processed_first() {
    let host = TestHost::new();
    let conf = host.live("/etc/app.conf");
    let command = CommandBuilder::new("reload")
        .dependfile("/etc/app.conf")
        .step("", &format!("test -f {}", conf.display()))
        .build();
    let mut ctx = round(vec![SpecBuilder::file("/etc/app.conf", "x").build()], vec![command]);

    processor(&host, RunMode::Normal)
        .process_command(&mut ctx, "reload")
        .unwrap();

    assert!(ctx.results().iter().all(|r| r.success));
    assert_eq!(ctx.results().len(), 2);
}

#[test]
fn test_dry_run_leaves_everything_untouched() {
    let host = TestHost::new();
    host.write("/etc/motd", "old\n");
    let pre = host.marker_command("pre.log", "pre");
    let spec = SpecBuilder::file("/etc/motd", "hello\n").pre(&pre).build();
    let mut ctx = round(vec![spec], vec![]);

    let outcome = processor(&host, RunMode::DryRun)
        .process_resource(&mut ctx, "/etc/motd")
        .unwrap();

    assert_eq!(outcome, Outcome::Changed);
    assert_eq!(host.read("/etc/motd"), "old\n");
    assert!(host.marker_lines("pre.log").is_empty());
    assert!(!host.state("orig/etc/motd.ORIG").exists());
    let message = &ctx.results()[0].message;
    assert!(message.contains("-old"), "{message}");
    assert!(message.contains("+hello"), "{message}");
}

#[test]
fn test_operator_skip_leaves_resource_alone() {
    let host = TestHost::new();
    host.write("/etc/motd", "old\n");
    let mut ctx = round(vec![SpecBuilder::file("/etc/motd", "hello\n").build()], vec![]);
    let processor = processor(&host, RunMode::Normal).with_prompter(Box::new(Always(Decision::Skip)));

    assert_eq!(processor.process_resource(&mut ctx, "/etc/motd").unwrap(), Outcome::Skipped);
    assert_eq!(host.read("/etc/motd"), "old\n");
    assert!(ctx.results()[0].message.contains("Skipped by operator"));
}

#[test]
fn test_operator_quit_releases_locks() {
    let host = TestHost::new();
    let specs = vec![
        SpecBuilder::file("/etc/b", "b").depend("/etc/a").build(),
        SpecBuilder::file("/etc/a", "a").build(),
    ];
    let mut ctx = round(specs, vec![]);
    let processor = processor(&host, RunMode::Normal).with_prompter(Box::new(Always(Decision::Quit)));

    assert_eq!(processor.process_resource(&mut ctx, "/etc/b").unwrap(), Outcome::Quit);
    assert!(ctx.results().is_empty());
    let locks: Vec<_> = std::fs::read_dir(host.layout().locks_dir()).unwrap().collect();
    assert!(locks.is_empty());
}

#[test]
fn test_held_lock_fails_the_resource() {
    let host = TestHost::new();
    let processor = processor(&host, RunMode::Normal);
    let _held = LockManager::new(host.layout().locks_dir())
        .acquire("/etc/motd")
        .unwrap();
    let mut ctx = round(vec![SpecBuilder::file("/etc/motd", "hello\n").build()], vec![]);

    let err = processor.process_resource(&mut ctx, "/etc/motd").unwrap_err();

    assert!(matches!(err, Error::LockTimeout { attempts: 2, .. }), "{err}");
    assert!(!host.exists("/etc/motd"));
}
