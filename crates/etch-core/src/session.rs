//! Session coordinator
//!
//! Drives the request/response rounds with the authority until nothing more
//! is asked for, processes what each round delivers, runs the once-per-run
//! commands and reports the results.

use std::fs;

use etch_fs::{AgentLayout, LockManager, checksum, io};
use etch_protocol::{Facts, ProcessingResult, RequestState, Resolver, RunReport};

use crate::config::AgentConfig;
use crate::exec::{ExecKind, Executor};
use crate::mode::RunMode;
use crate::processor::{ItemKey, Outcome, Processor, RunContext};
use crate::prompt::Prompter;
use crate::requests::LocalRequests;
use crate::transcript::Transcript;
use crate::{Error, Result};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
/// The agent is administratively disabled and did nothing.
pub const EXIT_DISABLED: i32 = 200;

const ONCE_PER_RUN: &str = "post_once_per_run";

/// Per-invocation choices that are not part of the configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Explicit resources; with no commands either, everything is requested
    pub targets: Vec<String>,
    pub commands: Vec<String>,
    pub override_disable: bool,
    /// Remove every lock file at start, not only stale ones
    pub kill_old_locks: bool,
    /// Include error source chains in result messages
    pub verbose: bool,
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub status: i32,
    pub message: String,
    pub results: Vec<ProcessingResult>,
}

/// Names the authority resolves for this host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub resources: Vec<String>,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundsEnd {
    Converged,
    Quit,
    Exhausted,
}

/// Item failures are already recorded; only run-level errors go on.
fn settle(outcome: Result<Outcome>) -> Result<Outcome> {
    match outcome {
        Err(err) if err.is_fatal_to_run() => Err(err),
        Err(_) => Ok(Outcome::Unchanged),
        ok => ok,
    }
}

pub struct Session<'a> {
    config: &'a AgentConfig,
    layout: AgentLayout,
    resolver: &'a dyn Resolver,
    facts: Facts,
    options: RunOptions,
    prompter: Option<Box<dyn Prompter>>,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a AgentConfig, resolver: &'a dyn Resolver, facts: Facts, options: RunOptions) -> Self {
        let mut layout = AgentLayout::new(&config.base_dir);
        if let Some(root) = &config.test_root {
            layout = layout.with_test_root(root);
        }
        Self {
            config,
            layout,
            resolver,
            facts,
            options,
            prompter: None,
        }
    }

    /// Ask the operator before every change.
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn layout(&self) -> &AgentLayout {
        &self.layout
    }

    /// The disable marker stops the run unless overridden.
    pub fn check_enabled(&self) -> Result<()> {
        let marker = self.layout.disable_marker();
        if self.options.override_disable || !marker.exists() {
            return Ok(());
        }
        let text = fs::read_to_string(&marker).map_err(|e| Error::io(&marker, e))?;
        let message = match text.trim() {
            "" => format!("disabled by {}", marker.display()),
            reason => reason.to_string(),
        };
        tracing::warn!(?marker, %message, "Agent is disabled");
        Err(Error::Disabled { message })
    }

    /// First request of the run.
    pub fn initial_request(&self) -> RequestState {
        if self.options.targets.is_empty() && self.options.commands.is_empty() {
            return RequestState::generate_all();
        }
        let mut request = RequestState::new();
        for target in &self.options.targets {
            request.request_file(target);
        }
        for command in &self.options.commands {
            request.request_command(command);
        }
        request
    }

    /// Resolve once and return the names, without processing anything.
    pub fn list(&self) -> Result<Listing> {
        let response = self.resolver.resolve(&self.facts, &self.initial_request())?;
        Ok(Listing {
            resources: response.resources.into_iter().map(|r| r.name).collect(),
            commands: response.commands.into_iter().map(|c| c.name).collect(),
        })
    }

    pub fn run(mut self) -> Result<RunSummary> {
        self.check_enabled()?;
        self.layout.ensure()?;
        let mode = self.options.mode;

        let locks = LockManager::new(self.layout.locks_dir())
            .with_retry(self.config.lock_attempts, self.config.lock_interval());
        let removed = locks.clean_stale(self.config.stale_lock_age(), self.options.kill_old_locks)?;
        if removed > 0 {
            tracing::info!(removed, "Removed old lock files");
        }

        let executor = Executor::new(mode, self.config.capture_timeout()).with_path(self.config.path.clone());
        let mut processor = Processor::new(&self.layout, mode, executor, locks)?.with_verbose(self.options.verbose);
        if let Some(prompter) = self.prompter.take() {
            processor = processor.with_prompter(prompter);
        }

        tracing::info!(%mode, fqdn = %self.facts.fqdn(), "Starting run");
        let mut ctx = RunContext::new();
        let end = self.converge(&processor, &mut ctx);

        // Never after an operator quit or an aborted run.
        if matches!(end, Ok(RoundsEnd::Converged | RoundsEnd::Exhausted)) {
            self.run_once_per_run(&processor, &mut ctx);
        }

        let results = ctx.into_results();
        let failed = results.iter().filter(|r| !r.success).count();
        let (status, message) = match end {
            Err(err) => {
                tracing::error!(error = %err, "Run aborted");
                (EXIT_FAILURE, err.to_string())
            }
            Ok(RoundsEnd::Exhausted) => (
                EXIT_FAILURE,
                format!("Configuration did not converge after {} rounds", self.config.max_rounds),
            ),
            Ok(end) => {
                let status = if failed == 0 { EXIT_SUCCESS } else { EXIT_FAILURE };
                let mut message = format!("{} processed, {failed} failed", results.len());
                if end == RoundsEnd::Quit {
                    message.push_str(", stopped by operator");
                }
                (status, message)
            }
        };

        let mut summary = RunSummary {
            status,
            message,
            results,
        };
        if mode.mutates() {
            self.report(&mut summary);
        }
        tracing::info!(status = summary.status, message = %summary.message, "Run finished");
        Ok(summary)
    }

    fn converge(&self, processor: &Processor, ctx: &mut RunContext) -> Result<RoundsEnd> {
        let local = LocalRequests::new(&self.layout);
        let mut request = self.initial_request();
        self.attach_local_requests(&local, &mut request);

        for round in 1..=self.config.max_rounds {
            tracing::debug!(round, "Requesting configuration");
            let response = self.resolver.resolve(&self.facts, &request)?;
            let resource_order: Vec<String> = response.resources.iter().map(|r| r.name.clone()).collect();
            let command_order: Vec<String> = response.commands.iter().map(|c| c.name.clone()).collect();
            tracing::debug!(
                round,
                resources = resource_order.len(),
                commands = command_order.len(),
                "Received configuration"
            );
            ctx.begin_round(response.resources, response.commands, request.wants_all());

            // Configs first: their setup steps may produce the originals asked for below.
            for name in &resource_order {
                if settle(processor.process_resource(ctx, name))? == Outcome::Quit {
                    return Ok(RoundsEnd::Quit);
                }
            }
            for name in &command_order {
                if settle(processor.process_command(ctx, name))? == Outcome::Quit {
                    return Ok(RoundsEnd::Quit);
                }
            }

            let mut next = RequestState::new();
            for key in ctx.take_deferred() {
                match key {
                    ItemKey::Resource(name) => {
                        next.request_file(&name);
                    }
                    ItemKey::Command(name) => next.request_command(&name),
                }
            }
            for name in &response.need_sums {
                match self.original(processor, name) {
                    Ok(content) => next.set_sha1sum(name, checksum::sha1_hex(&content)),
                    Err(err) => self.record_failure(ctx, name, &err),
                }
            }
            for name in &response.need_origs {
                match self.original(processor, name) {
                    Ok(content) => next.set_contents(name, content),
                    Err(err) => self.record_failure(ctx, name, &err),
                }
            }
            for name in &response.retry_commands {
                next.request_command(name);
            }

            if next.is_empty() {
                tracing::debug!(round, "Converged");
                return Ok(RoundsEnd::Converged);
            }
            self.attach_local_requests(&local, &mut next);
            request = next;
        }

        tracing::error!(rounds = self.config.max_rounds, "Giving up on convergence");
        let unresolved: Vec<ItemKey> = request
            .files()
            .map(|(name, _)| ItemKey::Resource(name.to_string()))
            .chain(request.commands().map(|name| ItemKey::Command(name.to_string())))
            .filter(|key| ctx.completion(key).is_none())
            .collect();
        for key in unresolved {
            let message = format!("Not resolved within {} rounds", self.config.max_rounds);
            ctx.record(ProcessingResult::new(key.name(), false, message));
        }
        Ok(RoundsEnd::Exhausted)
    }

    /// Original content of `name` as the authority expects it. Dry runs
    /// never create archive entries.
    fn original(&self, processor: &Processor, name: &str) -> Result<Vec<u8>> {
        let live = self.layout.live_path(name)?;
        if processor.mode().mutates() {
            processor.archive().contents(name, &live)
        } else {
            processor.archive().preview_contents(name, &live)
        }
    }

    fn record_failure(&self, ctx: &mut RunContext, name: &str, err: &Error) {
        tracing::error!(resource = %name, error = %err, "Could not read original");
        let mut transcript = Transcript::new();
        transcript.error(err, self.options.verbose);
        ctx.record(ProcessingResult::new(name, false, transcript.into_string()));
    }

    fn attach_local_requests(&self, local: &LocalRequests, request: &mut RequestState) {
        let names: Vec<String> = request.files().map(|(name, _)| name.to_string()).collect();
        for name in names {
            match local.collect(&name) {
                Ok(Some(document)) => request.set_local_requests(&name, document),
                Ok(None) => {}
                Err(err) => tracing::warn!(resource = %name, error = %err, "Skipping local requests"),
            }
        }
    }

    fn run_once_per_run(&self, processor: &Processor, ctx: &mut RunContext) {
        let commands = ctx.take_once_per_run();
        if commands.is_empty() {
            return;
        }
        let mut transcript = Transcript::new();
        for command in &commands {
            if let Err(err) = processor.executor().run(ExecKind::Post, ONCE_PER_RUN, command, &mut transcript) {
                transcript.error(&err, self.options.verbose);
            }
        }
        tracing::info!(count = commands.len(), output = %transcript, "Ran once-per-run commands");
    }

    /// Send results to every configured destination. A failed submission
    /// fails the run but never loses the local copies.
    fn report(&self, summary: &mut RunSummary) {
        for path in self.config.result_files() {
            for result in &summary.results {
                let written = serde_json::to_string(result)
                    .map_err(Error::from)
                    .and_then(|line| io::append_line(&path, &line).map_err(Error::from));
                if let Err(err) = written {
                    tracing::error!(?path, error = %err, "Failed to write results");
                    summary.status = EXIT_FAILURE;
                    break;
                }
            }
        }

        if !self.config.reports_to_server() || !self.resolver.accepts_reports() {
            return;
        }
        let report = RunReport {
            fqdn: self.facts.fqdn().to_string(),
            status: summary.status,
            message: summary.message.clone(),
            results: summary.results.clone(),
        };
        if let Err(err) = self.resolver.report(&report) {
            tracing::error!(error = %err, "Failed to submit results");
            summary.status = EXIT_FAILURE;
            summary.message = format!("{}; result submission failed: {err}", summary.message);
        }
    }
}
