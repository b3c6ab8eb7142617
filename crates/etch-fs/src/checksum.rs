//! Checksum utilities
//!
//! Two formats are in use:
//! - bare lowercase SHA-1 hex, which is what the authority expects for
//!   original-file sums on the wire;
//! - `sha256:<hex>`, used locally for backup payload integrity.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Prefix for integrity checksums produced by this module
const SHA256_PREFIX: &str = "sha256:";

/// Compute the SHA-1 of `content` as lowercase hex.
pub fn sha1_hex(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 checksum of `content` in the canonical `"sha256:<hex>"` format.
pub fn compute_content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", SHA256_PREFIX, hasher.finalize())
}

/// Compute the SHA-256 checksum of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{}{:x}", SHA256_PREFIX, hasher.finalize()))
}
