use std::path::Path;

use etch_fs::{NodeKind, NodeState, io, meta};
use etch_protocol::LinkAction;

use super::{ChangeSet, Desired, Engine, guard_directory};
use crate::transcript::Transcript;
use crate::{Error, Result};

pub(super) fn plan(engine: &Engine, name: &str, action: &LinkAction, state: &NodeState) -> Result<ChangeSet> {
    guard_directory(name, state, action.overwrite_directory)?;

    let dest = engine.map_path(&action.dest);
    if !action.allow_nonexistent_dest && !meta::probe(&dest)?.exists() {
        return Err(Error::LinkDestMissing {
            name: name.to_string(),
            dest: action.dest.clone(),
        });
    }

    let desired = Desired::resolve(&action.attrs)?;
    let caps = engine.link_caps();
    let (perms, owner) = desired.drift(state, NodeKind::Symlink);
    let content = state.kind != NodeKind::Symlink || state.link_target.as_deref() != Some(dest.as_path());
    let diff = content.then(|| {
        let current = match state.kind {
            NodeKind::Symlink => state
                .link_target
                .as_deref()
                .map(|t| t.display().to_string())
                .unwrap_or_default(),
            kind => format!("({kind})"),
        };
        format!("{name}: {current} -> {}\n", action.dest)
    });

    Ok(ChangeSet {
        content,
        perms: perms && caps.chmod,
        owner: owner && caps.chown,
        diff,
    })
}

pub(super) fn apply(
    engine: &Engine,
    name: &str,
    action: &LinkAction,
    live: &Path,
    changes: &ChangeSet,
    transcript: &mut Transcript,
) -> Result<()> {
    let desired = Desired::resolve(&action.attrs)?;
    if changes.content {
        let dest = engine.map_path(&action.dest);
        io::remove_node(live)?;
        if let Some(parent) = live.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::os::unix::fs::symlink(&dest, live).map_err(|e| Error::io(live, e))?;
        tracing::info!(resource = %name, dest = %action.dest, "Created symlink");
        transcript.line(format_args!("Linked {name} -> {}", action.dest));
    }

    let caps = engine.link_caps();
    if caps.chown {
        engine.set_owner(name, live, &desired, transcript)?;
    }
    if caps.chmod
        && let Some(mode) = desired.mode
    {
        meta::chmod_link(live, mode)?;
    }
    Ok(())
}
