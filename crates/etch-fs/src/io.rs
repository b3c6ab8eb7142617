//! Atomic replacement, metadata-preserving copies and node removal
//!
//! New file payloads are staged in a temporary sibling of the target so the
//! final rename never crosses a filesystem boundary and readers never see a
//! partially-written file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::meta::{self, NodeKind};
use crate::{Error, Result};

/// A payload written next to its final location, not yet visible there.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Write `content` to a temporary sibling of `target`.
    ///
    /// The parent directory is created if needed.
    pub fn create(target: &Path, content: &[u8]) -> Result<Self> {
        let parent = parent_of(target);
        fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".etchtmp")
            .tempfile_in(&parent)
            .map_err(|e| Error::io(&parent, e))?;

        temp.write_all(content)
            .map_err(|e| Error::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io(temp.path(), e))?;

        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    /// Path of the staged (temporary) file.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Set permission bits on the staged file.
    pub fn set_mode(&self, mode: u32) -> Result<()> {
        meta::chmod(self.temp.path(), mode)
    }

    /// Move the staged file into place.
    ///
    /// A non-regular node at the target (directory, symlink, fifo) is removed
    /// first; a regular file is replaced atomically by the rename.
    pub fn commit(self) -> Result<()> {
        let current = meta::probe(&self.target)?;
        if !matches!(current.kind, NodeKind::File | NodeKind::Missing) {
            remove_node(&self.target)?;
        }
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| Error::io(&target, e.error))?;
        Ok(())
    }
}

/// Write `content` to `path` atomically with default permissions.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    StagedFile::create(path, content)?.commit()
}

/// Append a line to `path`, creating it if necessary.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    writeln!(file, "{line}").map_err(|e| Error::io(path, e))
}

/// Remove whatever node exists at `path`. Missing paths are not an error.
pub fn remove_node(path: &Path) -> Result<()> {
    let result = match meta::probe(path)?.kind {
        NodeKind::Missing => return Ok(()),
        NodeKind::Directory => fs::remove_dir_all(path),
        _ => fs::remove_file(path),
    };
    result.map_err(|e| Error::io(path, e))
}

/// Copy a node (file, symlink or directory tree) preserving permissions and,
/// where privilege allows, ownership.
///
/// Symlinks are copied as symlinks. Ownership failures are ignored: a copy
/// made by an unprivileged process is owned by that process.
pub fn copy_node(src: &Path, dst: &Path) -> Result<()> {
    let state = meta::probe(src)?;
    match state.kind {
        NodeKind::Missing => Err(Error::io(
            src,
            std::io::Error::new(std::io::ErrorKind::NotFound, "source does not exist"),
        )),
        NodeKind::Directory => copy_tree(src, dst),
        _ => copy_leaf(src, dst),
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            Error::io(path, e.into())
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(Path::new(""));
        let out = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&out).map_err(|e| Error::io(&out, e))?;
        } else {
            copy_leaf(entry.path(), &out)?;
        }
    }
    // Directory modes are applied after their contents so read-only
    // directories can still be populated.
    for entry in WalkDir::new(src).follow_links(false).contents_first(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            Error::io(path, e.into())
        })?;
        if entry.file_type().is_dir() {
            let relative = entry.path().strip_prefix(src).unwrap_or(Path::new(""));
            copy_metadata(entry.path(), &dst.join(relative))?;
        }
    }
    Ok(())
}

fn copy_leaf(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let state = meta::probe(src)?;
    match state.kind {
        NodeKind::Symlink => {
            let target = state.link_target.unwrap_or_default();
            std::os::unix::fs::symlink(&target, dst).map_err(|e| Error::io(dst, e))?;
            meta::preserve_owner(dst, state.uid, state.gid)
        }
        NodeKind::File => {
            fs::copy(src, dst).map_err(|e| Error::io(dst, e))?;
            copy_metadata(src, dst)
        }
        kind => {
            tracing::warn!(path = %src.display(), %kind, "Skipping special file during copy");
            Ok(())
        }
    }
}

fn copy_metadata(src: &Path, dst: &Path) -> Result<()> {
    let state = meta::probe(src)?;
    meta::preserve_owner(dst, state.uid, state.gid)?;
    meta::chmod(dst, state.mode)
}

/// Move a node, falling back to copy-and-remove across filesystems.
pub fn move_node(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(nix::libc::EXDEV) => {
            copy_node(src, dst)?;
            remove_node(src)
        }
        Err(e) => Err(Error::io(dst, e)),
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
