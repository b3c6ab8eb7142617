//! Original-state archive
//!
//! The first time a resource is about to change, its pre-existing state is
//! saved under `orig/` at the mirrored path with one of these suffixes:
//!
//! | suffix    | meaning                                                      |
//! |-----------|--------------------------------------------------------------|
//! | `.ORIG`   | copy of a regular file or symlink                            |
//! | `.DIR`    | directory replaced by a directory: metadata only              |
//! | `.TAR`    | directory replaced by something else: full tar snapshot      |
//! | `.NOORIG` | nothing existed                                              |
//! | `.TMP`    | directory snapshot taken before its handling was known       |
//!
//! At most one definitive record exists per resource. A `.TMP` record is
//! turned into `.DIR` or `.TAR` once a spec for the resource arrives.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use etch_fs::{AgentLayout, NodeKind, checksum, io, meta};

use crate::{Error, Result};

pub const ORIG_SUFFIX: &str = ".ORIG";
pub const DIR_SUFFIX: &str = ".DIR";
pub const TAR_SUFFIX: &str = ".TAR";
pub const NOORIG_SUFFIX: &str = ".NOORIG";
pub const TMP_SUFFIX: &str = ".TMP";

/// A saved original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalRecord {
    Copy(PathBuf),
    DirectoryRecord(PathBuf),
    DirectoryTar(PathBuf),
    Absent(PathBuf),
    Provisional(PathBuf),
}

impl OriginalRecord {
    pub fn path(&self) -> &Path {
        match self {
            Self::Copy(p)
            | Self::DirectoryRecord(p)
            | Self::DirectoryTar(p)
            | Self::Absent(p)
            | Self::Provisional(p) => p,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

/// How the resource is going to be handled, which decides what to keep of a
/// live directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveIntent {
    /// A directory will stay a directory
    KeepDirectory,
    /// Whatever is there will be replaced or removed
    Replace,
    /// Not known yet
    Provisional,
}

#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(layout: &AgentLayout) -> Self {
        Self {
            root: layout.orig_dir(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn base(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(etch_fs::relative_name(name)?))
    }

    fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
        let mut os = base.as_os_str().to_owned();
        os.push(suffix);
        PathBuf::from(os)
    }

    /// The record currently saved for `name`, if any.
    pub fn record(&self, name: &str) -> Result<Option<OriginalRecord>> {
        let base = self.base(name)?;
        let candidates: [(&str, fn(PathBuf) -> OriginalRecord); 5] = [
            (ORIG_SUFFIX, OriginalRecord::Copy),
            (DIR_SUFFIX, OriginalRecord::DirectoryRecord),
            (TAR_SUFFIX, OriginalRecord::DirectoryTar),
            (NOORIG_SUFFIX, OriginalRecord::Absent),
            (TMP_SUFFIX, OriginalRecord::Provisional),
        ];
        for (suffix, make) in candidates {
            let path = Self::with_suffix(&base, suffix);
            if meta::probe(&path)?.exists() {
                return Ok(Some(make(path)));
            }
        }
        Ok(None)
    }

    /// Save the original state of `name` found at `live`.
    ///
    /// Returns `true` when a definitive record was created by this call.
    pub fn save(&self, name: &str, live: &Path, intent: SaveIntent) -> Result<bool> {
        match self.record(name)? {
            Some(OriginalRecord::Provisional(tmp)) if intent != SaveIntent::Provisional => {
                self.resolve_provisional(name, &tmp, live, intent)?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                let created = self.save_new(name, live, intent)?;
                Ok(created && intent != SaveIntent::Provisional)
            }
        }
    }

    fn save_new(&self, name: &str, live: &Path, intent: SaveIntent) -> Result<bool> {
        let base = self.base(name)?;
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let state = meta::probe(live)?;
        match state.kind {
            NodeKind::Missing => {
                let path = Self::with_suffix(&base, NOORIG_SUFFIX);
                File::create(&path).map_err(|e| Error::io(&path, e))?;
            }
            NodeKind::File | NodeKind::Symlink => {
                io::copy_node(live, &Self::with_suffix(&base, ORIG_SUFFIX))?;
            }
            NodeKind::Directory => match intent {
                SaveIntent::KeepDirectory => {
                    save_directory_record(live, &Self::with_suffix(&base, DIR_SUFFIX))?;
                }
                SaveIntent::Replace => {
                    write_tar(live, &Self::with_suffix(&base, TAR_SUFFIX))?;
                }
                SaveIntent::Provisional => {
                    write_tar(live, &Self::with_suffix(&base, TMP_SUFFIX))?;
                }
            },
            NodeKind::Other => {
                return Err(Error::UnsupportedNode {
                    name: name.to_string(),
                    kind: state.kind.to_string(),
                });
            }
        }
        tracing::info!(resource = %name, kind = %state.kind, ?intent, "Saved original");
        Ok(true)
    }

    fn resolve_provisional(&self, name: &str, tmp: &Path, live: &Path, intent: SaveIntent) -> Result<()> {
        let base = self.base(name)?;
        match intent {
            SaveIntent::KeepDirectory => {
                io::remove_node(tmp)?;
                save_directory_record(live, &Self::with_suffix(&base, DIR_SUFFIX))?;
            }
            _ => {
                let tar = Self::with_suffix(&base, TAR_SUFFIX);
                fs::rename(tmp, &tar).map_err(|e| Error::io(&tar, e))?;
            }
        }
        tracing::debug!(resource = %name, ?intent, "Resolved provisional original");
        Ok(())
    }

    /// Raw content of the original, saving it first if needed.
    ///
    /// Absent originals and directory records have empty content.
    pub fn contents(&self, name: &str, live: &Path) -> Result<Vec<u8>> {
        self.save(name, live, SaveIntent::Provisional)?;
        let record = self.record(name)?.ok_or_else(|| Error::InvalidSpec {
            name: name.to_string(),
            message: "original could not be saved".to_string(),
        })?;
        match &record {
            OriginalRecord::Copy(path) => {
                let state = meta::probe(path)?;
                if state.kind == NodeKind::Symlink {
                    let dest = state.link_target.unwrap_or_default();
                    Ok(dest.into_os_string().into_encoded_bytes())
                } else {
                    fs::read(path).map_err(|e| Error::io(path, e))
                }
            }
            OriginalRecord::DirectoryTar(path) | OriginalRecord::Provisional(path) => {
                fs::read(path).map_err(|e| Error::io(path, e))
            }
            OriginalRecord::DirectoryRecord(_) | OriginalRecord::Absent(_) => Ok(Vec::new()),
        }
    }

    /// SHA-1 of the original, as the authority expects it.
    pub fn checksum(&self, name: &str, live: &Path) -> Result<String> {
        Ok(checksum::sha1_hex(&self.contents(name, live)?))
    }

    /// Like [`Archive::contents`], but never writes: with nothing archived
    /// yet, the live node stands in for the original.
    pub fn preview_contents(&self, name: &str, live: &Path) -> Result<Vec<u8>> {
        if self.record(name)?.is_some() {
            return self.contents(name, live);
        }
        let state = meta::probe(live)?;
        match state.kind {
            NodeKind::File => fs::read(live).map_err(|e| Error::io(live, e)),
            NodeKind::Symlink => Ok(state
                .link_target
                .unwrap_or_default()
                .into_os_string()
                .into_encoded_bytes()),
            _ => Ok(Vec::new()),
        }
    }

    /// Mode of the original, when it existed.
    pub fn original_mode(&self, name: &str) -> Result<Option<u32>> {
        Ok(match self.record(name)? {
            Some(OriginalRecord::Copy(p)) | Some(OriginalRecord::DirectoryRecord(p)) => {
                Some(meta::probe(&p)?.mode)
            }
            _ => None,
        })
    }

    /// Put the original back at `live` and forget it.
    ///
    /// Returns `false` when nothing was archived. A provisional record means
    /// the resource was never changed, so only the record is dropped.
    pub fn restore(&self, name: &str, live: &Path) -> Result<bool> {
        let Some(record) = self.record(name)? else {
            return Ok(false);
        };
        match &record {
            OriginalRecord::Copy(path) => {
                io::remove_node(live)?;
                io::copy_node(path, live)?;
            }
            OriginalRecord::DirectoryRecord(path) => {
                let saved = meta::probe(path)?;
                if meta::probe(live)?.kind != NodeKind::Directory {
                    io::remove_node(live)?;
                    fs::create_dir_all(live).map_err(|e| Error::io(live, e))?;
                }
                meta::preserve_owner(live, saved.uid, saved.gid)?;
                meta::chmod(live, saved.mode)?;
            }
            OriginalRecord::DirectoryTar(path) => {
                io::remove_node(live)?;
                unpack_tar(path, live)?;
            }
            OriginalRecord::Absent(_) => {
                io::remove_node(live)?;
            }
            OriginalRecord::Provisional(_) => {}
        }
        io::remove_node(record.path())?;
        tracing::info!(resource = %name, "Restored original and removed archive entry");
        Ok(true)
    }
}

fn save_directory_record(live: &Path, record: &Path) -> Result<()> {
    let state = meta::probe(live)?;
    fs::create_dir_all(record).map_err(|e| Error::io(record, e))?;
    meta::preserve_owner(record, state.uid, state.gid)?;
    meta::chmod(record, state.mode)?;
    Ok(())
}

fn write_tar(dir: &Path, out: &Path) -> Result<()> {
    let file = File::create(out).map_err(|e| Error::io(out, e))?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", dir)
        .map_err(|e| Error::io(dir, e))?;
    builder
        .into_inner()
        .and_then(|f| f.sync_all())
        .map_err(|e| Error::io(out, e))
}

fn unpack_tar(tar_path: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    let file = File::open(tar_path).map_err(|e| Error::io(tar_path, e))?;
    let mut archive = tar::Archive::new(file);
    archive.set_preserve_permissions(true);
    archive.set_preserve_ownerships(meta::running_privileged());
    archive.unpack(dest).map_err(|e| Error::io(dest, e))
}
