//! etch CLI
//!
//! Fetches this host's resolved configuration and reconciles the filesystem
//! with it.

mod cli;
mod commands;
mod error;
mod interactive;
mod logging;

use clap::Parser;
use colored::Colorize;
use etch_core::{ConfigResolver, EXIT_FAILURE};

use cli::Cli;
use error::Result;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.debug) {
        eprintln!("{}: could not set up logging: {e}", "warning".yellow().bold());
    }

    match run(&cli) {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let resolver = match &cli.config {
        Some(path) => ConfigResolver::new(path),
        None => ConfigResolver::default(),
    };
    let config = resolver.resolve(&cli.overrides())?;
    tracing::debug!(?config, "Resolved configuration");

    if cli.list_resources {
        commands::run_list(cli, &config)?;
        return Ok(0);
    }
    commands::run_agent(cli, &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_error_user() {
        let error = crate::error::CliError::user("test error");
        assert_eq!(format!("{}", error), "test error");
    }

    #[test]
    fn test_missing_authority_is_a_user_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let cli = Cli::parse_from([
            "etch".to_string(),
            "--config".to_string(),
            temp.path().join("etch.toml").display().to_string(),
            "--base-dir".to_string(),
            temp.path().display().to_string(),
        ]);
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("No authority configured"), "{err}");
    }
}
