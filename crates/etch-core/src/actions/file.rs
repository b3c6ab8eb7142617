use std::fs;
use std::path::Path;

use etch_fs::{NodeKind, NodeState, StagedFile, meta};
use etch_protocol::FileAction;
use similar::TextDiff;

use super::{ChangeSet, Desired, Engine, guard_directory};
use crate::transcript::Transcript;
use crate::{Error, Result};

const DEFAULT_MODE: u32 = 0o644;

pub(super) fn plan(name: &str, action: &FileAction, live: &Path, state: &NodeState) -> Result<ChangeSet> {
    guard_directory(name, state, action.overwrite_directory)?;
    let desired = Desired::resolve(&action.attrs)?;
    let (perms, owner) = desired.drift(state, NodeKind::File);

    let current = match state.kind {
        NodeKind::File => Some(fs::read(live).map_err(|e| Error::io(live, e))?),
        _ => None,
    };
    let content = current.as_deref() != Some(action.contents.as_slice());
    let diff = content.then(|| describe_diff(name, current.as_deref().unwrap_or_default(), &action.contents));

    Ok(ChangeSet {
        content,
        perms,
        owner,
        diff,
    })
}

fn describe_diff(name: &str, old: &[u8], new: &[u8]) -> String {
    match (std::str::from_utf8(old), std::str::from_utf8(new)) {
        (Ok(old), Ok(new)) => TextDiff::from_lines(old, new)
            .unified_diff()
            .header(name, name)
            .to_string(),
        _ => format!("Binary content of {name} differs\n"),
    }
}

pub(super) fn apply(
    engine: &Engine,
    name: &str,
    action: &FileAction,
    live: &Path,
    changes: &ChangeSet,
    transcript: &mut Transcript,
) -> Result<()> {
    let desired = Desired::resolve(&action.attrs)?;
    let state = meta::probe(live)?;

    if !changes.content {
        engine.set_owner(name, live, &desired, transcript)?;
        if let Some(mode) = desired.mode {
            meta::chmod(live, mode)?;
        }
        tracing::info!(resource = %name, changes = %changes.summary(), "Updated file attributes");
        transcript.line(format_args!("Updated {} of {name}", changes.summary()));
        return Ok(());
    }

    let staged = StagedFile::create(live, &action.contents)?;
    if desired.manages_owner() {
        engine.set_owner(name, staged.path(), &desired, transcript)?;
    } else if state.kind == NodeKind::File {
        // Unmanaged ownership follows the file being replaced.
        meta::preserve_owner(staged.path(), state.uid, state.gid)?;
    }

    let mode = desired.mode.unwrap_or(match state.kind {
        NodeKind::File => state.mode,
        _ => DEFAULT_MODE,
    });
    staged.set_mode(mode)?;
    staged.commit()?;

    tracing::info!(resource = %name, bytes = action.contents.len(), mode = %format!("{mode:04o}"), "Wrote file");
    transcript.line(format_args!("Wrote {name} ({} bytes, mode {mode:04o})", action.contents.len()));
    Ok(())
}
