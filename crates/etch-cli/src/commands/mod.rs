//! Command implementations for etch-cli

mod list;
mod run;

use etch_core::AgentConfig;
use etch_protocol::{FactSource, Facts, HostFacts, HttpResolver, LocalResolver, Resolver, Signer};

use crate::cli::Cli;
use crate::error::{CliError, Result};

pub use list::run_list;
pub use run::run_agent;

/// Local bundles when configured, otherwise the authority named by `server`.
fn build_resolver(config: &AgentConfig, debug: bool) -> Result<Box<dyn Resolver>> {
    if let Some(dir) = &config.local {
        tracing::debug!(dir = %dir.display(), "Using local bundles");
        return Ok(Box::new(LocalResolver::load(dir)?));
    }
    let Some(server) = &config.server else {
        return Err(CliError::user(
            "No authority configured: set `server` in the config file, or pass --server or --local",
        ));
    };
    let signer = Signer::load_or_unsigned(config.key.as_deref());
    let resolver = HttpResolver::new(server, signer)?
        .with_debug(debug)
        .with_tag(config.tag.clone());
    Ok(Box::new(resolver))
}

fn host_facts(cli: &Cli) -> Facts {
    let mut source = HostFacts::new();
    if let Some(fqdn) = &cli.fqdn {
        source = source.with_fqdn(fqdn);
    }
    source.collect()
}
