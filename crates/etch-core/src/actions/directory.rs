use std::path::Path;

use etch_fs::{NodeKind, NodeState, io, meta};
use etch_protocol::DirectoryAction;

use super::{ChangeSet, Desired, Engine};
use crate::transcript::Transcript;
use crate::{Error, Result};

const DEFAULT_MODE: u32 = 0o755;

/// Without `create`, only an existing directory is managed.
pub(super) fn plan(action: &DirectoryAction, state: &NodeState) -> Result<ChangeSet> {
    let is_directory = state.kind == NodeKind::Directory;
    if !is_directory && !action.create {
        return Ok(ChangeSet::default());
    }
    let desired = Desired::resolve(&action.attrs)?;
    let (perms, owner) = desired.drift(state, NodeKind::Directory);
    let content = !is_directory;
    let diff = content.then(|| match state.kind {
        NodeKind::Missing => "create directory\n".to_string(),
        kind => format!("replace {kind} with directory\n"),
    });
    Ok(ChangeSet {
        content,
        perms,
        owner,
        diff,
    })
}

pub(super) fn apply(
    engine: &Engine,
    name: &str,
    action: &DirectoryAction,
    live: &Path,
    changes: &ChangeSet,
    transcript: &mut Transcript,
) -> Result<()> {
    let desired = Desired::resolve(&action.attrs)?;
    if changes.content {
        io::remove_node(live)?;
        std::fs::create_dir_all(live).map_err(|e| Error::io(live, e))?;
        meta::chmod(live, desired.mode.unwrap_or(DEFAULT_MODE))?;
        tracing::info!(resource = %name, "Created directory");
        transcript.line(format_args!("Created directory {name}"));
    } else if let Some(mode) = desired.mode.filter(|_| changes.perms) {
        meta::chmod(live, mode)?;
        transcript.line(format_args!("Set mode of {name} to {mode:04o}"));
    }
    engine.set_owner(name, live, &desired, transcript)?;
    // chown clears setuid/setgid on some systems
    if changes.owner
        && let Some(mode) = desired.mode
    {
        meta::chmod(live, mode)?;
    }
    Ok(())
}
