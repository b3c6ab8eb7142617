//! Error types for etch-protocol

use std::path::PathBuf;

/// Result type for etch-protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to an authority
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Filesystem error: {0}")]
    Fs(#[from] etch_fs::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid authority URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Authority returned HTTP {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Malformed response from authority: {message}")]
    MalformedResponse { message: String },

    #[error("Unusable private key {path}: {message}")]
    Key { path: PathBuf, message: String },

    #[error("Failed to sign request: {message}")]
    Signing { message: String },

    #[error("Duplicate {kind} '{name}' in {path}")]
    DuplicateEntry {
        kind: &'static str,
        name: String,
        path: PathBuf,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
