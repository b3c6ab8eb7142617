//! Non-dereferencing node probes and ownership/permission primitives
//!
//! Every probe uses `symlink_metadata` so a symlink is reported as a symlink,
//! never as whatever it points at.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::sys::stat::{FchmodatFlags, Mode, fchmodat};
use nix::unistd::{FchownatFlags, Gid, Group, Uid, User, fchownat};

use crate::{Error, Result};

/// Permission bits that can be managed (including setuid/setgid/sticky).
pub const MODE_MASK: u32 = 0o7777;

/// Fundamental kind of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Missing,
    File,
    Symlink,
    Directory,
    /// Sockets, fifos, devices
    Other,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::File => "file",
            Self::Symlink => "symlink",
            Self::Directory => "directory",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the live state of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub kind: NodeKind,
    /// Permission bits masked with [`MODE_MASK`]; zero when missing.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Destination of a symlink, verbatim.
    pub link_target: Option<PathBuf>,
}

impl NodeState {
    fn missing() -> Self {
        Self {
            kind: NodeKind::Missing,
            mode: 0,
            uid: 0,
            gid: 0,
            link_target: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.kind != NodeKind::Missing
    }
}

/// Probe `path` without following a final symlink.
pub fn probe(path: &Path) -> Result<NodeState> {
    let md = match std::fs::symlink_metadata(path) {
        Ok(md) => md,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(NodeState::missing()),
        Err(e) => return Err(Error::io(path, e)),
    };
    let ft = md.file_type();
    let kind = if ft.is_symlink() {
        NodeKind::Symlink
    } else if ft.is_file() {
        NodeKind::File
    } else if ft.is_dir() {
        NodeKind::Directory
    } else {
        NodeKind::Other
    };
    let link_target = if kind == NodeKind::Symlink {
        Some(std::fs::read_link(path).map_err(|e| Error::io(path, e))?)
    } else {
        None
    };
    Ok(NodeState {
        kind,
        mode: md.permissions().mode() & MODE_MASK,
        uid: md.uid(),
        gid: md.gid(),
        link_target,
    })
}

/// Parse an octal permission string such as `"0644"` or `"755"`.
pub fn parse_mode(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= MODE_MASK)
        .ok_or_else(|| Error::InvalidMode {
            value: value.to_string(),
        })
}

/// Resolve a symbolic or numeric user to a uid.
pub fn resolve_uid(spec: &str) -> Result<u32> {
    if let Ok(uid) = spec.parse::<u32>() {
        return Ok(uid);
    }
    match User::from_name(spec) {
        Ok(Some(user)) => Ok(user.uid.as_raw()),
        _ => Err(Error::UnknownUser {
            name: spec.to_string(),
        }),
    }
}

/// Resolve a symbolic or numeric group to a gid.
pub fn resolve_gid(spec: &str) -> Result<u32> {
    if let Ok(gid) = spec.parse::<u32>() {
        return Ok(gid);
    }
    match Group::from_name(spec) {
        Ok(Some(group)) => Ok(group.gid.as_raw()),
        _ => Err(Error::UnknownGroup {
            name: spec.to_string(),
        }),
    }
}

/// Whether this process runs with an effective uid of 0.
pub fn running_privileged() -> bool {
    Uid::effective().is_root()
}

/// Change ownership of `path` itself, never of a symlink's destination.
pub fn chown_nofollow(path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
    fchownat(
        None,
        path,
        uid.map(Uid::from_raw),
        gid.map(Gid::from_raw),
        FchownatFlags::NoFollowSymlink,
    )
    .map_err(|source| Error::Chown {
        path: path.to_path_buf(),
        source,
    })
}

/// Give `path` the owner of the node it was copied from.
///
/// Privilege errors are tolerated when not running as root; everything else
/// is an error.
pub fn preserve_owner(path: &Path, uid: u32, gid: u32) -> Result<()> {
    tolerate_unprivileged(chown_nofollow(path, Some(uid), Some(gid)), running_privileged())
}

fn tolerate_unprivileged(result: Result<()>, privileged: bool) -> Result<()> {
    match result {
        Err(e) if !privileged && is_permission_error(&e) => {
            tracing::debug!(error = %e, "Ownership not preserved without privilege");
            Ok(())
        }
        other => other,
    }
}

/// Set permission bits on a regular file or directory.
pub fn chmod(path: &Path, mode: u32) -> Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & MODE_MASK))
        .map_err(|e| Error::io(path, e))
}

/// Set permission bits on a symlink itself.
///
/// Many platforms (Linux included) reject this; callers probe support first.
pub fn chmod_link(path: &Path, mode: u32) -> Result<()> {
    fchmodat(
        None,
        path,
        Mode::from_bits_truncate((mode & MODE_MASK) as nix::libc::mode_t),
        FchmodatFlags::NoFollowSymlink,
    )
    .map_err(|e| Error::io(path, std::io::Error::from_raw_os_error(e as i32)))
}

/// Whether a chown error is a privilege error rather than a real failure.
pub fn is_permission_error(err: &Error) -> bool {
    match err {
        Error::Chown { source, .. } => {
            matches!(source, nix::Error::EPERM | nix::Error::EACCES)
        }
        Error::Io { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
        _ => false,
    }
}
