//! Pre-mutation backups used to roll back a failed verification

use std::path::{Path, PathBuf};

use etch_fs::{NodeKind, checksum, io, meta};
use tempfile::TempDir;

use crate::{Error, Result};

const BACKUP_PREFIX: &str = ".etchbackup";
const BACKUP_ENTRY: &str = "node";

#[derive(Debug)]
enum Saved {
    /// Nothing existed at the live path
    Absent,
    Node {
        path: PathBuf,
        /// SHA-256 of regular-file payloads
        checksum: Option<String>,
    },
}

/// Copy of a resource taken just before it is changed.
///
/// The copy lives in a temporary directory beside the resource so that
/// restoring it is a rename. The directory is removed when this is dropped.
#[derive(Debug)]
pub struct Backup {
    name: String,
    live: PathBuf,
    dir: TempDir,
    saved: Saved,
}

impl Backup {
    pub fn create(name: &str, live: &Path) -> Result<Self> {
        let parent = live
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        std::fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix(BACKUP_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| Error::io(&parent, e))?;

        let state = meta::probe(live)?;
        let saved = if state.exists() {
            let path = dir.path().join(BACKUP_ENTRY);
            io::copy_node(live, &path)?;
            let checksum = match state.kind {
                NodeKind::File => Some(
                    checksum::compute_file_checksum(&path).map_err(|e| Error::io(&path, e))?,
                ),
                _ => None,
            };
            Saved::Node { path, checksum }
        } else {
            Saved::Absent
        };
        tracing::debug!(resource = %name, backup = ?dir.path(), "Backup created");

        Ok(Self {
            name: name.to_string(),
            live: live.to_path_buf(),
            dir,
            saved,
        })
    }

    pub fn live(&self) -> &Path {
        &self.live
    }

    /// Put the backed-up node back in place of whatever exists now.
    pub fn restore(self) -> Result<()> {
        if let Saved::Node { path, checksum: Some(expected) } = &self.saved {
            if !meta::probe(path)?.exists() {
                return Err(Error::BackupMissing { name: self.name });
            }
            let actual = checksum::compute_file_checksum(path).map_err(|e| Error::io(path, e))?;
            if &actual != expected {
                return Err(Error::BackupCorrupt {
                    name: self.name,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        match &self.saved {
            Saved::Absent => io::remove_node(&self.live)?,
            Saved::Node { path, .. } => {
                if !meta::probe(path)?.exists() {
                    return Err(Error::BackupMissing { name: self.name });
                }
                io::remove_node(&self.live)?;
                io::move_node(path, &self.live)?;
            }
        }
        tracing::info!(resource = %self.name, "Rolled back to backup");
        drop(self.dir);
        Ok(())
    }
}
