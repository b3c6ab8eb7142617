//! `--list-resources`

use colored::Colorize;
use etch_core::{AgentConfig, Session};

use super::{build_resolver, host_facts};
use crate::cli::Cli;
use crate::error::Result;

/// Print what the authority resolves for this host.
pub fn run_list(cli: &Cli, config: &AgentConfig) -> Result<()> {
    let resolver = build_resolver(config, cli.debug)?;
    let session = Session::new(config, resolver.as_ref(), host_facts(cli), cli.run_options());
    let listing = session.list()?;

    println!("{}", "Resources:".bold());
    if listing.resources.is_empty() {
        println!("   {}", "(none)".dimmed());
    }
    for name in &listing.resources {
        println!("   {name}");
    }
    println!("{}", "Commands:".bold());
    if listing.commands.is_empty() {
        println!("   {}", "(none)".dimmed());
    }
    for name in &listing.commands {
        println!("   {name}");
    }
    Ok(())
}
