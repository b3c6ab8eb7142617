use std::path::Path;

use super::ChangeSet;
use crate::Result;
use crate::archive::{Archive, OriginalRecord};
use crate::transcript::Transcript;

/// A revert is pending for as long as an original is archived.
pub(super) fn plan(name: &str, archive: &Archive) -> Result<ChangeSet> {
    let diff = match archive.record(name)? {
        None => return Ok(ChangeSet::default()),
        Some(OriginalRecord::Absent(_)) => "remove (did not exist originally)\n".to_string(),
        Some(OriginalRecord::Provisional(_)) => "forget unused archive entry\n".to_string(),
        Some(_) => "restore original\n".to_string(),
    };
    Ok(ChangeSet {
        content: true,
        diff: Some(diff),
        ..ChangeSet::default()
    })
}

pub(super) fn apply(name: &str, live: &Path, archive: &Archive, transcript: &mut Transcript) -> Result<()> {
    if archive.restore(name, live)? {
        transcript.line(format_args!("Reverted {name} to its original state"));
    }
    Ok(())
}
