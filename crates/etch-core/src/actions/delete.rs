use std::path::Path;

use etch_fs::{NodeState, io};
use etch_protocol::DeleteAction;

use super::{ChangeSet, guard_directory};
use crate::transcript::Transcript;
use crate::{Error, Result};

pub(super) fn plan(name: &str, action: &DeleteAction, state: &NodeState) -> Result<ChangeSet> {
    if !action.proceed {
        return Err(Error::InvalidSpec {
            name: name.to_string(),
            message: "delete requires proceed".to_string(),
        });
    }
    if !state.exists() {
        return Ok(ChangeSet::default());
    }
    guard_directory(name, state, action.overwrite_directory)?;
    Ok(ChangeSet {
        content: true,
        diff: Some(format!("remove {}\n", state.kind)),
        ..ChangeSet::default()
    })
}

pub(super) fn apply(name: &str, live: &Path, transcript: &mut Transcript) -> Result<()> {
    io::remove_node(live)?;
    tracing::info!(resource = %name, "Deleted");
    transcript.line(format_args!("Deleted {name}"));
    Ok(())
}
