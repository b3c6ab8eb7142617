//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::Parser;
use etch_core::{ConfigLayer, RunMode, RunOptions};

/// etch - bring this host in line with its resolved configuration
///
/// Examples:
///   etch                            # Reconcile everything
///   etch /etc/motd /etc/ntp.conf    # Only these resources
///   etch --command reload-postfix   # Only this command
///   etch --dry-run                  # Show what would change
///   etch --local ./bundles          # Use local bundles instead of a server
#[derive(Parser, Debug)]
#[command(name = "etch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Resources to reconcile (absolute paths); all when none are given
    pub targets: Vec<String>,

    /// Command to run (repeatable)
    #[arg(long = "command", value_name = "NAME")]
    pub commands: Vec<String>,

    /// Authority URL
    #[arg(long, env = "ETCH_SERVER")]
    pub server: Option<String>,

    /// Directory of local bundles, used instead of a server
    #[arg(long, value_name = "DIR", conflicts_with = "server")]
    pub local: Option<PathBuf>,

    /// RSA private key used to sign requests
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// System configuration file
    #[arg(long, value_name = "PATH", env = "ETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Agent state directory
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Map every managed path under this directory
    #[arg(long, value_name = "DIR")]
    pub test_root: Option<PathBuf>,

    /// Tag passed to the authority
    #[arg(long)]
    pub tag: Option<String>,

    /// Report as this host name instead of the detected one
    #[arg(long, hide = true)]
    pub fqdn: Option<String>,

    /// Show what would change without changing anything
    #[arg(long, conflicts_with = "damp_run")]
    pub dry_run: bool,

    /// Like --dry-run, but run setup commands
    #[arg(long)]
    pub damp_run: bool,

    /// Ask before every change
    #[arg(short, long)]
    pub interactive: bool,

    /// Debug logging, verbose errors, and debug output from the authority
    #[arg(long)]
    pub debug: bool,

    /// Remove every lock file before starting
    #[arg(long)]
    pub kill_old_locks: bool,

    /// Run even if the agent has been disabled
    #[arg(long)]
    pub override_disable: bool,

    /// List resources and commands without processing them
    #[arg(long)]
    pub list_resources: bool,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else if self.damp_run {
            RunMode::DampRun
        } else {
            RunMode::Normal
        }
    }

    /// Command-line layer, applied over every configuration file.
    pub fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            server: self.server.clone(),
            local: self.local.clone(),
            key: self.key.clone(),
            base_dir: self.base_dir.clone(),
            test_root: self.test_root.clone(),
            tag: self.tag.clone(),
            ..ConfigLayer::default()
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode(),
            targets: self.targets.clone(),
            commands: self.commands.clone(),
            override_disable: self.override_disable,
            kill_old_locks: self.kill_old_locks,
            verbose: self.debug,
        }
    }
}
