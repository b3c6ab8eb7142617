//! Resource action engine
//!
//! Each kind is handled in two phases. [`Engine::plan`] compares the desired
//! state against the live node (never following a final symlink) and yields
//! a [`ChangeSet`]; [`Engine::apply`] carries out a non-empty change set.

mod delete;
mod directory;
mod file;
mod link;
mod revert;

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use etch_fs::{NodeKind, NodeState, meta};
use etch_protocol::{Action, Attributes, ResourceSpec};

use crate::archive::{Archive, SaveIntent};
use crate::transcript::Transcript;
use crate::{Error, Result};

/// What has to change for a resource to match its spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Content, link destination or existence
    pub content: bool,
    pub perms: bool,
    pub owner: bool,
    /// Human-readable description of the content change
    pub diff: Option<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.content && !self.perms && !self.owner
    }

    /// One-line summary such as `content, perms`.
    pub fn summary(&self) -> String {
        let parts: Vec<&str> = [
            (self.content, "content"),
            (self.perms, "perms"),
            (self.owner, "owner"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect();
        parts.join(", ")
    }
}

/// Resolved [`Attributes`]; `None` leaves the attribute alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Desired {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Desired {
    pub fn resolve(attrs: &Attributes) -> Result<Self> {
        Ok(Self {
            mode: attrs.perms.as_deref().map(meta::parse_mode).transpose()?,
            uid: attrs.owner.as_deref().map(meta::resolve_uid).transpose()?,
            gid: attrs.group.as_deref().map(meta::resolve_gid).transpose()?,
        })
    }

    fn manages_owner(&self) -> bool {
        self.uid.is_some() || self.gid.is_some()
    }

    /// Permission and ownership drift of `state`, which should be `kind`.
    ///
    /// A node of another kind always needs whatever attributes are managed.
    fn drift(&self, state: &NodeState, kind: NodeKind) -> (bool, bool) {
        if state.kind != kind {
            return (self.mode.is_some(), self.manages_owner());
        }
        let perms = self.mode.is_some_and(|mode| mode != state.mode);
        let owner = self.uid.is_some_and(|uid| uid != state.uid)
            || self.gid.is_some_and(|gid| gid != state.gid);
        (perms, owner)
    }
}

/// Whether this platform can change attributes of a symlink itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCaps {
    pub chown: bool,
    pub chmod: bool,
}

impl LinkCaps {
    fn probe() -> Self {
        let caps = Self::try_probe().unwrap_or(Self {
            chown: false,
            chmod: false,
        });
        tracing::debug!(chown = caps.chown, chmod = caps.chmod, "Probed symlink attribute support");
        caps
    }

    fn try_probe() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let link = dir.path().join("probe");
        std::os::unix::fs::symlink("target", &link)?;
        let state = meta::probe(&link).map_err(std::io::Error::other)?;
        Ok(Self {
            chown: meta::chown_nofollow(&link, Some(state.uid), Some(state.gid)).is_ok(),
            chmod: meta::chmod_link(&link, 0o777).is_ok(),
        })
    }
}

/// Per-run action engine.
#[derive(Debug)]
pub struct Engine {
    test_root: Option<PathBuf>,
    privileged: bool,
    link_caps: OnceCell<LinkCaps>,
}

impl Engine {
    pub fn new(test_root: Option<PathBuf>) -> Self {
        Self {
            test_root,
            privileged: meta::running_privileged(),
            link_caps: OnceCell::new(),
        }
    }

    /// Probed on first use, then fixed for the run.
    pub fn link_caps(&self) -> LinkCaps {
        *self.link_caps.get_or_init(LinkCaps::probe)
    }

    /// Map an absolute path from a spec under the test root.
    pub(crate) fn map_path(&self, path: &str) -> PathBuf {
        match (&self.test_root, Path::new(path).strip_prefix("/")) {
            (Some(root), Ok(relative)) => root.join(relative),
            _ => PathBuf::from(path),
        }
    }

    pub fn plan(&self, spec: &ResourceSpec, live: &Path, archive: &Archive) -> Result<ChangeSet> {
        let state = meta::probe(live)?;
        let name = spec.name.as_str();
        match &spec.action {
            Action::File(action) => file::plan(name, action, live, &state),
            Action::Link(action) => link::plan(self, name, action, &state),
            Action::Directory(action) => directory::plan(action, &state),
            Action::Delete(action) => delete::plan(name, action, &state),
            Action::Revert => revert::plan(name, archive),
        }
    }

    pub fn apply(
        &self,
        spec: &ResourceSpec,
        live: &Path,
        archive: &Archive,
        changes: &ChangeSet,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let name = spec.name.as_str();
        match &spec.action {
            Action::File(action) => file::apply(self, name, action, live, changes, transcript),
            Action::Link(action) => link::apply(self, name, action, live, changes, transcript),
            Action::Directory(action) => directory::apply(self, name, action, live, changes, transcript),
            Action::Delete(_) => delete::apply(name, live, transcript),
            Action::Revert => revert::apply(name, live, archive, transcript),
        }
    }

    /// Change ownership, tolerating privilege errors when not root.
    fn set_owner(&self, name: &str, path: &Path, desired: &Desired, transcript: &mut Transcript) -> Result<()> {
        if !desired.manages_owner() {
            return Ok(());
        }
        match meta::chown_nofollow(path, desired.uid, desired.gid) {
            Ok(()) => Ok(()),
            Err(e) if !self.privileged && meta::is_permission_error(&e) => {
                tracing::warn!(resource = %name, error = %e, "Ownership not changed without privilege");
                transcript.line(format_args!("Warning: could not change ownership: {e}"));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// How the archive should treat a live directory for this action.
pub fn save_intent(action: &Action) -> Option<SaveIntent> {
    match action {
        Action::Revert => None,
        Action::Directory(_) => Some(SaveIntent::KeepDirectory),
        Action::File(_) | Action::Link(_) | Action::Delete(_) => Some(SaveIntent::Replace),
    }
}

/// Refuse to replace a live directory unless the resource allows it.
fn guard_directory(name: &str, state: &NodeState, allowed: bool) -> Result<()> {
    if state.kind == NodeKind::Directory && !allowed {
        return Err(Error::DirectoryOverwrite {
            name: name.to_string(),
        });
    }
    Ok(())
}
