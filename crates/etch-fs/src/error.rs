//! Error types for etch-fs

use std::path::PathBuf;

/// Result type for etch-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in etch-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config at {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Resource name must be an absolute path: {name}")]
    InvalidResourceName { name: String },

    #[error("Unknown user: {name}")]
    UnknownUser { name: String },

    #[error("Unknown group: {name}")]
    UnknownGroup { name: String },

    #[error("Invalid permission mode: {value}")]
    InvalidMode { value: String },

    #[error("Failed to change ownership of {path}: {source}")]
    Chown {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("Lock for {name} is held by process {holder} (gave up after {attempts} attempts)")]
    LockTimeout {
        name: String,
        holder: String,
        attempts: u32,
    },

    #[error("Lock for {name} is owned by process {holder}, not by this process ({pid})")]
    LockNotOwned { name: String, holder: String, pid: u32 },

    #[error("Lock for {name} is not held")]
    LockMissing { name: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
