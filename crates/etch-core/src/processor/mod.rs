//! Dependency-aware processor
//!
//! Resources and commands are processed depth-first: an item is locked, its
//! dependencies are processed recursively, then its own work happens. The
//! [`RunContext`] records what is on the current chain (cycle detection) and
//! what already finished (each item runs at most once per run).
//!
//! Every processed item yields one [`ProcessingResult`] carrying its
//! transcript. Errors abort only the item and whatever depends on it.

mod command;
pub mod context;
mod resource;

use etch_fs::{AgentLayout, LockManager};
use etch_protocol::ProcessingResult;

pub use context::{Completion, ItemKey, RunContext};

use crate::actions::Engine;
use crate::archive::Archive;
use crate::exec::Executor;
use crate::history::HistoryLog;
use crate::mode::RunMode;
use crate::prompt::{Confirmation, Decision, Prompter};
use crate::transcript::Transcript;
use crate::{Error, Result};

/// How processing of one item ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Changes were applied (or would be, in a dry run)
    Changed,
    Unchanged,
    /// A `test` failed and the change was rolled back
    RolledBack,
    /// The operator chose to skip it
    Skipped,
    /// Waiting for a dependency the authority has not sent yet
    Deferred,
    /// The operator ended the run
    Quit,
}

pub struct Processor {
    layout: AgentLayout,
    mode: RunMode,
    verbose: bool,
    executor: Executor,
    engine: Engine,
    archive: Archive,
    history: Option<HistoryLog>,
    locks: LockManager,
    prompter: Option<Box<dyn Prompter>>,
}

impl Processor {
    /// The history store is only opened for runs that change things.
    pub fn new(layout: &AgentLayout, mode: RunMode, executor: Executor, locks: LockManager) -> Result<Self> {
        let history = if mode.mutates() {
            Some(HistoryLog::open(layout)?)
        } else {
            None
        };
        Ok(Self {
            layout: layout.clone(),
            mode,
            verbose: false,
            executor,
            engine: Engine::new(layout.test_root().map(ToOwned::to_owned)),
            archive: Archive::new(layout),
            history,
            locks,
            prompter: None,
        })
    }

    /// Include error source chains in result messages.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Ask before every change.
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Process a top-level resource from the current round.
    pub fn process_resource(&self, ctx: &mut RunContext, name: &str) -> Result<Outcome> {
        self.process(ctx, ItemKey::Resource(name.to_string()))
    }

    /// Process a top-level command from the current round.
    pub fn process_command(&self, ctx: &mut RunContext, name: &str) -> Result<Outcome> {
        self.process(ctx, ItemKey::Command(name.to_string()))
    }

    fn process(&self, ctx: &mut RunContext, key: ItemKey) -> Result<Outcome> {
        if ctx.completion(&key).is_some() {
            return Ok(Outcome::Unchanged);
        }
        if ctx.is_in_progress(&key) {
            let held = ctx.chain();
            tracing::error!(item = %key, ?held, "Circular dependency");
            return Err(Error::CircularDependency {
                name: key.name().to_string(),
                held,
            });
        }

        ctx.enter(key.clone());
        let mut transcript = Transcript::new();
        let outcome = match &key {
            ItemKey::Resource(name) => self.run_resource(ctx, name, &mut transcript),
            ItemKey::Command(name) => self.run_command(ctx, name, &mut transcript),
        };
        ctx.leave();

        match &outcome {
            Ok(Outcome::Deferred) => {
                tracing::debug!(item = %key, "Deferred until its dependencies arrive");
            }
            Ok(Outcome::Quit) => {}
            Ok(result) => {
                if *result == Outcome::Skipped {
                    transcript.line("Skipped by operator");
                }
                ctx.complete(key.clone(), Completion::Succeeded);
                ctx.record(ProcessingResult::new(key.name(), true, transcript.into_string()));
            }
            Err(err) => {
                tracing::error!(item = %key, error = %err, "Processing failed");
                transcript.error(err, self.verbose);
                ctx.complete(key.clone(), Completion::Failed);
                ctx.record(ProcessingResult::new(key.name(), false, transcript.into_string()));
            }
        }
        outcome
    }

    /// Process `dependency` on behalf of `dependent`.
    ///
    /// A dependency missing from this round is requested for the next one,
    /// unless it was already asked for, in which case it will never come.
    fn resolve_dependency(&self, ctx: &mut RunContext, dependent: &ItemKey, dependency: ItemKey) -> Result<Outcome> {
        let available = match &dependency {
            ItemKey::Resource(name) => ctx.resource(name).is_some(),
            ItemKey::Command(name) => ctx.command(name).is_some(),
        };
        if !available && ctx.completion(&dependency).is_none() {
            if !ctx.can_request(&dependency) {
                return Err(Error::UnknownDependency {
                    name: dependent.name().to_string(),
                    dependency: dependency.name().to_string(),
                });
            }
            tracing::debug!(item = %dependent, dependency = %dependency, "Dependency not in this round");
            ctx.defer(dependency);
            ctx.defer(dependent.clone());
            return Ok(Outcome::Deferred);
        }

        if ctx.completion(&dependency) == Some(Completion::Failed) {
            return Err(Error::DependencyFailed {
                name: dependent.name().to_string(),
                dependency: dependency.name().to_string(),
            });
        }
        match self.process(ctx, dependency.clone()) {
            Ok(Outcome::Deferred) => {
                ctx.defer(dependent.clone());
                Ok(Outcome::Deferred)
            }
            Ok(outcome) => Ok(outcome),
            Err(err @ Error::CircularDependency { .. }) => Err(err),
            Err(_) => Err(Error::DependencyFailed {
                name: dependent.name().to_string(),
                dependency: dependency.name().to_string(),
            }),
        }
    }

    /// Resolve every dependency in order. Returns the outcome that stops the
    /// dependent, if any: a quit ends it at once, deferrals are collected.
    fn resolve_all(
        &self,
        ctx: &mut RunContext,
        dependent: &ItemKey,
        dependencies: impl IntoIterator<Item = ItemKey>,
    ) -> Result<Option<Outcome>> {
        let mut deferred = false;
        for dependency in dependencies {
            match self.resolve_dependency(ctx, dependent, dependency)? {
                Outcome::Quit => return Ok(Some(Outcome::Quit)),
                Outcome::Deferred => deferred = true,
                _ => {}
            }
        }
        Ok(deferred.then_some(Outcome::Deferred))
    }

    fn confirm(&self, request: Confirmation<'_>) -> Result<Decision> {
        match &self.prompter {
            Some(prompter) => prompter.confirm(&request),
            None => Ok(Decision::Proceed),
        }
    }
}
