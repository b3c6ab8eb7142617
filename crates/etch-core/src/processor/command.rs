//! Guarded multi-step commands

use etch_protocol::Step;

use super::{ItemKey, Outcome, Processor, RunContext};
use crate::exec::ExecKind;
use crate::prompt::{Confirmation, Decision};
use crate::transcript::Transcript;
use crate::{Error, Result};

impl Processor {
    pub(super) fn run_command(&self, ctx: &mut RunContext, name: &str, transcript: &mut Transcript) -> Result<Outcome> {
        let spec = ctx.command(name).cloned().ok_or_else(|| Error::InvalidSpec {
            name: name.to_string(),
            message: "no command definition received".to_string(),
        })?;
        let key = ItemKey::Command(spec.name.clone());
        let _lock = self.locks.acquire(&key.lock_name()).map_err(Error::from_lock)?;

        let dependencies = spec
            .depend
            .iter()
            .map(|c| ItemKey::Command(c.clone()))
            .chain(spec.dependfile.iter().map(|f| ItemKey::Resource(f.clone())));
        if let Some(outcome) = self.resolve_all(ctx, &key, dependencies)? {
            return Ok(outcome);
        }

        let mut outcome = Outcome::Unchanged;
        for step in &spec.steps {
            match self.run_step(name, step, transcript)? {
                Outcome::Unchanged => {}
                Outcome::Skipped => return Ok(Outcome::Skipped),
                Outcome::Quit => return Ok(Outcome::Quit),
                other => outcome = other,
            }
        }
        Ok(outcome)
    }

    /// A step whose guard passes is already satisfied. Otherwise its command
    /// runs and the guard must pass afterwards.
    fn run_step(&self, name: &str, step: &Step, transcript: &mut Transcript) -> Result<Outcome> {
        let guarded = !step.guard.is_empty();
        if guarded && self.executor.run_all(ExecKind::Guard, name, &step.guard, transcript)? {
            tracing::debug!(command = %name, "Guard satisfied, skipping step");
            return Ok(Outcome::Unchanged);
        }
        if step.command.is_empty() {
            return Ok(Outcome::Unchanged);
        }

        match self.confirm(Confirmation::Command {
            name,
            command: &step.command,
        })? {
            Decision::Proceed => {}
            Decision::Skip => return Ok(Outcome::Skipped),
            Decision::Quit => return Ok(Outcome::Quit),
        }

        let succeeded = self.executor.run_all(ExecKind::Command, name, &step.command, transcript)?;
        if !self.mode.mutates() {
            return Ok(Outcome::Changed);
        }

        if guarded {
            if !self.executor.run_all(ExecKind::Guard, name, &step.guard, transcript)? {
                return Err(Error::GuardStillFailing {
                    name: name.to_string(),
                    guard: step.guard.join("; "),
                });
            }
            if !succeeded {
                transcript.line("Warning: command failed but its guard is now satisfied");
            }
        } else if !succeeded {
            return Err(Error::ExecFailed {
                name: name.to_string(),
                kind: ExecKind::Command.as_str(),
                command: step.command.join("; "),
                status: "non-zero exit".to_string(),
            });
        }
        Ok(Outcome::Changed)
    }
}
