//! Error types for etch-core

use std::path::PathBuf;

/// Result type for etch-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling a host
///
/// Everything except [`Error::Protocol`] and [`Error::Disabled`] aborts only the
/// resource or command being processed (and whatever depends on it).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A setup or pre command exited non-zero
    #[error("{kind} command for {name} failed ({status}): {command}")]
    ExecFailed {
        name: String,
        kind: &'static str,
        command: String,
        status: String,
    },

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("test_before_post failed for {name}, change rolled back")]
    TestBeforePostFailed { name: String },

    #[error("Circular dependency detected at {name} (locks held: {})", held.join(", "))]
    CircularDependency { name: String, held: Vec<String> },

    #[error("Lock for {name} is held by process {holder} (gave up after {attempts} attempts)")]
    LockTimeout {
        name: String,
        holder: String,
        attempts: u32,
    },

    #[error("{name} is a directory; set overwrite_directory to replace it")]
    DirectoryOverwrite { name: String },

    #[error("Unexpected response: {response:?}")]
    UnexpectedResponse { response: String },

    #[error("{name} depends on {dependency}, which failed")]
    DependencyFailed { name: String, dependency: String },

    #[error("{name} depends on {dependency}, which the authority did not provide")]
    UnknownDependency { name: String, dependency: String },

    #[error("Guard for {name} still fails after running its command: {guard}")]
    GuardStillFailing { name: String, guard: String },

    #[error("Backup of {name} is missing, cannot roll back")]
    BackupMissing { name: String },

    #[error("Backup of {name} is corrupt (expected {expected}, found {actual})")]
    BackupCorrupt {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Link destination {dest} for {name} does not exist")]
    LinkDestMissing { name: String, dest: String },

    #[error("Invalid configuration for {name}: {message}")]
    InvalidSpec { name: String, message: String },

    #[error("Cannot manage {name}: unsupported node type {kind}")]
    UnsupportedNode { name: String, kind: String },

    #[error("Configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// The authority could not be reached or answered badly
    #[error("Protocol error: {0}")]
    Protocol(#[from] etch_protocol::Error),

    #[error("etch is disabled: {message}")]
    Disabled { message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fs(#[from] etch_fs::Error),

    #[error(transparent)]
    History(#[from] etch_history::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error ends the whole run rather than one resource.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Disabled { .. })
    }

    /// Lift lock-layer errors into their engine-level variant.
    pub(crate) fn from_lock(err: etch_fs::Error) -> Self {
        match err {
            etch_fs::Error::LockTimeout {
                name,
                holder,
                attempts,
            } => Self::LockTimeout {
                name,
                holder,
                attempts,
            },
            other => Self::Fs(other),
        }
    }
}
