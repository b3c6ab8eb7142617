//! Per-resource state machine
//!
//! lock → dependencies → setup → plan → confirm → pre → backup → archive
//! → history → apply → test_before_post → post → test → history.
//! The lock guard lives on this frame, so it is released on every exit path.

use std::path::Path;

use etch_protocol::ResourceSpec;

use super::{ItemKey, Outcome, Processor, RunContext};
use crate::actions::{self, ChangeSet};
use crate::backup::Backup;
use crate::exec::ExecKind;
use crate::prompt::{Confirmation, Decision};
use crate::transcript::Transcript;
use crate::{Error, Result};

impl Processor {
    pub(super) fn run_resource(&self, ctx: &mut RunContext, name: &str, transcript: &mut Transcript) -> Result<Outcome> {
        let spec = ctx.resource(name).cloned().ok_or_else(|| Error::InvalidSpec {
            name: name.to_string(),
            message: "no configuration received".to_string(),
        })?;
        let key = ItemKey::Resource(spec.name.clone());
        let _lock = self.locks.acquire(&key.lock_name()).map_err(Error::from_lock)?;

        let dependencies = spec
            .depend
            .iter()
            .map(|d| ItemKey::Resource(d.clone()))
            .chain(spec.dependcommand.iter().map(|c| ItemKey::Command(c.clone())));
        if let Some(outcome) = self.resolve_all(ctx, &key, dependencies)? {
            return Ok(outcome);
        }

        self.executor.run_all(ExecKind::Setup, name, &spec.setup, transcript)?;

        let live = self.layout.live_path(name)?;
        let changes = self.engine.plan(&spec, &live, &self.archive)?;
        if changes.is_empty() {
            tracing::debug!(resource = %name, "No changes needed");
            return Ok(Outcome::Unchanged);
        }
        tracing::debug!(resource = %name, changes = %changes.summary(), "Changes needed");
        transcript.line(format_args!("Changes needed: {}", changes.summary()));
        if let Some(diff) = &changes.diff {
            transcript.append(diff);
        }

        match self.confirm(Confirmation::Resource {
            name,
            changes: &changes,
        })? {
            Decision::Proceed => {}
            Decision::Skip => return Ok(Outcome::Skipped),
            Decision::Quit => return Ok(Outcome::Quit),
        }

        if !self.mode.mutates() {
            tracing::info!(resource = %name, changes = %changes.summary(), mode = %self.mode, "Would apply changes");
            transcript.line(format_args!("Would apply changes ({})", self.mode));
            self.executor.run_all(ExecKind::Pre, name, &spec.pre, transcript)?;
            self.executor.run_all(ExecKind::Post, name, &spec.post, transcript)?;
            return Ok(Outcome::Changed);
        }

        self.mutate(ctx, &spec, &live, &changes, transcript)
    }

    fn mutate(
        &self,
        ctx: &mut RunContext,
        spec: &ResourceSpec,
        live: &Path,
        changes: &ChangeSet,
        transcript: &mut Transcript,
    ) -> Result<Outcome> {
        let name = spec.name.as_str();
        self.executor.run_all(ExecKind::Pre, name, &spec.pre, transcript)?;

        let backup = if spec.has_tests() {
            Some(Backup::create(name, live)?)
        } else {
            None
        };

        let saved = match actions::save_intent(&spec.action) {
            Some(intent) => self.archive.save(name, live, intent)?,
            None => false,
        };
        let original_mode = self.archive.original_mode(name)?;
        // The original may have been archived by an earlier checksum request;
        // the first change is the one that seeds the history entry.
        let first_change = match &self.history {
            Some(history) => {
                let seeded = history.bootstrap(name, &self.archive)?;
                history.record(name, live, original_mode, "before update")?;
                seeded
            }
            None => saved,
        };

        if let Err(err) = self.engine.apply(spec, live, &self.archive, changes, transcript) {
            if let Some(backup) = backup {
                self.roll_back(name, Some(backup), transcript)?;
            }
            return Err(err);
        }

        if !self.executor.run_all(ExecKind::TestBeforePost, name, &spec.test_before_post, transcript)? {
            self.roll_back(name, backup, transcript)?;
            return Err(Error::TestBeforePostFailed {
                name: name.to_string(),
            });
        }

        if first_change {
            self.run_posts(name, &spec.post_once, transcript);
        }
        ctx.queue_once_per_run(&spec.post_once_per_run);
        self.run_posts(name, &spec.post, transcript);

        let outcome = if self.executor.run_all(ExecKind::Test, name, &spec.test, transcript)? {
            Outcome::Changed
        } else {
            tracing::warn!(resource = %name, "Test failed, rolling back");
            transcript.line("Test failed, rolling back and re-running post");
            self.roll_back(name, backup, transcript)?;
            self.run_posts(name, &spec.post, transcript);
            Outcome::RolledBack
        };

        if let Some(history) = &self.history {
            history.record(name, live, original_mode, "after update")?;
        }
        Ok(outcome)
    }

    /// Post commands only warn, so every one of them gets its turn.
    fn run_posts(&self, name: &str, commands: &[String], transcript: &mut Transcript) {
        for command in commands {
            if let Err(err) = self.executor.run(ExecKind::Post, name, command, transcript) {
                tracing::warn!(resource = %name, %command, error = %err, "Post command could not run");
                transcript.error(&err, self.verbose);
            }
        }
    }

    fn roll_back(&self, name: &str, backup: Option<Backup>, transcript: &mut Transcript) -> Result<()> {
        let backup = backup.ok_or_else(|| Error::BackupMissing {
            name: name.to_string(),
        })?;
        backup.restore()?;
        transcript.line(format_args!("Restored {name} from backup"));
        Ok(())
    }
}
