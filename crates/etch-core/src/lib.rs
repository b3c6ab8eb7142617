//! Reconciliation engine for the etch configuration agent
//!
//! The [`Session`] fetches resolved configuration from a [`Resolver`],
//! hands each resource and command to the [`Processor`], and reports the
//! results. Processing covers dependency ordering, locking, the original
//! archive, history, backups, the per-kind action engine and command
//! execution.
//!
//! [`Resolver`]: etch_protocol::Resolver

pub mod actions;
pub mod archive;
pub mod backup;
pub mod config;
pub mod error;
pub mod exec;
pub mod history;
pub mod mode;
pub mod processor;
pub mod prompt;
pub mod requests;
pub mod session;
pub mod transcript;

pub use actions::{ChangeSet, Engine};
pub use archive::{Archive, OriginalRecord, SaveIntent};
pub use backup::Backup;
pub use config::{AgentConfig, ConfigLayer, ConfigResolver};
pub use error::{Error, Result};
pub use exec::{ExecKind, Executor};
pub use history::HistoryLog;
pub use mode::RunMode;
pub use processor::{Outcome, Processor, RunContext};
pub use prompt::{Confirmation, Decision, Prompter};
pub use requests::LocalRequests;
pub use session::{EXIT_DISABLED, EXIT_FAILURE, EXIT_SUCCESS, Listing, RunOptions, RunSummary, Session};
pub use transcript::Transcript;
