//! A reconciliation run

use colored::Colorize;
use etch_core::{AgentConfig, EXIT_DISABLED, RunSummary, Session};

use super::{build_resolver, host_facts};
use crate::cli::Cli;
use crate::error::Result;
use crate::interactive::TerminalPrompter;

/// Run the agent and return the process exit status.
pub fn run_agent(cli: &Cli, config: &AgentConfig) -> Result<i32> {
    let resolver = build_resolver(config, cli.debug)?;
    let mut session = Session::new(config, resolver.as_ref(), host_facts(cli), cli.run_options());
    if cli.interactive {
        session = session.with_prompter(Box::new(TerminalPrompter));
    }

    match session.run() {
        Ok(summary) => {
            print_summary(&summary, cli.mode().mutates());
            Ok(summary.status)
        }
        Err(etch_core::Error::Disabled { message }) => {
            println!("{} etch is disabled: {message}", "DISABLED".yellow().bold());
            println!("Run with {} to run anyway.", "--override-disable".cyan());
            Ok(EXIT_DISABLED)
        }
        Err(err) => Err(err.into()),
    }
}

fn print_summary(summary: &RunSummary, mutating: bool) {
    for result in &summary.results {
        if result.message.trim().is_empty() {
            continue;
        }
        let marker = if result.success { "+".green() } else { "!".red() };
        println!("{marker} {}", result.file.bold());
        for line in result.message.lines() {
            println!("   {line}");
        }
    }

    let label = match (summary.status == 0, mutating) {
        (true, true) => "OK".green().bold(),
        (true, false) => "DRY RUN".yellow().bold(),
        (false, _) => "ERROR".red().bold(),
    };
    println!("{label} {}", summary.message);
}
