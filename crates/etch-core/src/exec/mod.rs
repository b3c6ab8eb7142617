//! Command execution with per-kind failure policy
//!
//! | kind               | on failure                                    |
//! |--------------------|-----------------------------------------------|
//! | `setup`, `pre`     | error, aborts the resource                    |
//! | `test_before_post` | `false`, caller rolls back and aborts         |
//! | `test`             | `false`, caller rolls back and re-runs post   |
//! | `post`             | warning                                       |
//! | `guard`            | `false`, silently                             |
//! | `command`          | `false`, caller re-checks the guard           |

pub mod capture;
pub mod priority;

use std::time::Duration;

use crate::mode::RunMode;
use crate::transcript::Transcript;
use crate::{Error, Result};

pub use capture::{Captured, run_captured};
pub use priority::NormalPriority;

/// Role of an executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecKind {
    Setup,
    Pre,
    Post,
    TestBeforePost,
    Test,
    Guard,
    Command,
}

impl ExecKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Pre => "pre",
            Self::Post => "post",
            Self::TestBeforePost => "test_before_post",
            Self::Test => "test",
            Self::Guard => "guard",
            Self::Command => "command",
        }
    }

    /// Steps that may (re)start long-lived processes.
    fn restores_priority(self) -> bool {
        matches!(self, Self::Post | Self::Command)
    }

    fn is_fatal(self) -> bool {
        matches!(self, Self::Setup | Self::Pre)
    }

    fn runs_in(self, mode: RunMode) -> bool {
        match self {
            Self::Setup => mode.runs_setup(),
            // Guards only observe, so they run in every mode.
            Self::Guard => true,
            _ => mode.mutates(),
        }
    }
}

impl std::fmt::Display for ExecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs lifecycle commands on behalf of the processor.
#[derive(Debug, Clone)]
pub struct Executor {
    mode: RunMode,
    path_env: Option<String>,
    timeout: Duration,
}

impl Executor {
    pub fn new(mode: RunMode, timeout: Duration) -> Self {
        Self {
            mode,
            path_env: None,
            timeout,
        }
    }

    /// Export `path` as `PATH` to every command.
    pub fn with_path(mut self, path: Option<String>) -> Self {
        self.path_env = path;
        self
    }

    /// Run one command for `name`.
    ///
    /// Returns whether it succeeded; only `setup` and `pre` failures are errors.
    pub fn run(&self, kind: ExecKind, name: &str, command: &str, transcript: &mut Transcript) -> Result<bool> {
        if !kind.runs_in(self.mode) {
            tracing::info!(resource = %name, %kind, %command, "Would run");
            transcript.line(format_args!("Would run {kind}: {command}"));
            return Ok(true);
        }

        tracing::debug!(resource = %name, %kind, %command, "Executing");
        if kind != ExecKind::Guard {
            transcript.line(format_args!("Running {kind}: {command}"));
        }

        let captured = {
            let _priority = kind.restores_priority().then(NormalPriority::enter);
            run_captured(command, self.path_env.as_deref(), self.timeout).map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })?
        };

        if kind != ExecKind::Guard {
            transcript.append(&captured.output);
        }
        if captured.timed_out {
            transcript.line(format_args!(
                "Output capture stopped after {}s",
                self.timeout.as_secs()
            ));
        }
        if captured.success() {
            return Ok(true);
        }

        let status = captured.describe_status();
        if kind.is_fatal() {
            tracing::error!(resource = %name, %kind, %command, %status, "Command failed");
            return Err(Error::ExecFailed {
                name: name.to_string(),
                kind: kind.as_str(),
                command: command.to_string(),
                status,
            });
        }
        match kind {
            ExecKind::Guard => {
                tracing::debug!(resource = %name, %command, %status, "Guard failed");
            }
            ExecKind::Post => {
                tracing::warn!(resource = %name, %command, %status, "Post command failed");
                transcript.line(format_args!("Warning: post command failed ({status})"));
            }
            _ => {
                tracing::warn!(resource = %name, %kind, %command, %status, "Command failed");
                transcript.line(format_args!("{kind} failed ({status})"));
            }
        }
        Ok(false)
    }

    /// Run every command in `commands`, stopping at the first failure.
    pub fn run_all(&self, kind: ExecKind, name: &str, commands: &[String], transcript: &mut Transcript) -> Result<bool> {
        for command in commands {
            if !self.run(kind, name, command, transcript)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn executor(mode: RunMode) -> Executor {
        Executor::new(mode, Duration::from_secs(30))
    }

    #[rstest]
    #[case(ExecKind::Setup)]
    #[case(ExecKind::Pre)]
    fn setup_and_pre_failures_are_errors(#[case] kind: ExecKind) {
        let mut t = Transcript::new();
        let err = executor(RunMode::Normal).run(kind, "/a", "exit 1", &mut t).unwrap_err();
        assert!(matches!(err, Error::ExecFailed { .. }), "{err}");
    }

    #[rstest]
    #[case(ExecKind::Post)]
    #[case(ExecKind::Test)]
    #[case(ExecKind::TestBeforePost)]
    #[case(ExecKind::Guard)]
    #[case(ExecKind::Command)]
    fn other_failures_are_reported_as_false(#[case] kind: ExecKind) {
        let mut t = Transcript::new();
        assert!(!executor(RunMode::Normal).run(kind, "/a", "exit 1", &mut t).unwrap());
    }

    #[test]
    fn guard_output_stays_out_of_transcript() {
        let mut t = Transcript::new();
        executor(RunMode::Normal)
            .run(ExecKind::Guard, "/a", "echo noisy", &mut t)
            .unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn output_is_captured_into_transcript() {
        let mut t = Transcript::new();
        executor(RunMode::Normal)
            .run(ExecKind::Post, "/a", "echo restarted", &mut t)
            .unwrap();
        assert!(t.as_str().contains("restarted\n"), "{t}");
    }

    #[test]
    fn dry_run_skips_everything_but_guards() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let cmd = format!("touch {}", marker.display());
        let mut t = Transcript::new();

        let exec = executor(RunMode::DryRun);
        assert!(exec.run(ExecKind::Setup, "/a", &cmd, &mut t).unwrap());
        assert!(exec.run(ExecKind::Post, "/a", &cmd, &mut t).unwrap());
        assert!(!marker.exists());

        exec.run(ExecKind::Guard, "/a", &cmd, &mut t).unwrap();
        assert!(marker.exists());
    }

    #[test]
    fn damp_run_executes_setup() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let mut t = Transcript::new();
        executor(RunMode::DampRun)
            .run(ExecKind::Setup, "/a", &format!("touch {}", marker.display()), &mut t)
            .unwrap();
        assert!(marker.exists());
    }
}
