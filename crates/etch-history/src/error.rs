//! Error types for etch-history

use std::path::PathBuf;

/// Result type for etch-history operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in etch-history operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] etch_fs::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path {path} is reserved for the revision store")]
    ReservedPath { path: PathBuf },

    #[error("Path {path} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
