//! Revision listing for individual history entries.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{DiffOptions, Repository};

use crate::Result;

/// One recorded revision of a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Short commit hash (7 characters)
    pub hash: String,

    /// First line of the revision message
    pub message: String,

    pub timestamp: DateTime<Utc>,
}

/// List the last `max_count` revisions that touched `relative`, newest first.
pub fn revisions_touching(
    repo: &Repository,
    relative: &Path,
    max_count: usize,
) -> Result<Vec<Revision>> {
    let head = match repo.head() {
        Ok(head) => head.peel_to_commit()?,
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut revwalk = repo.revwalk()?;
    revwalk.push(head.id())?;
    revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;

    let mut revisions = Vec::new();
    for oid in revwalk {
        if revisions.len() >= max_count {
            break;
        }
        let commit = repo.find_commit(oid?)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };

        let mut opts = DiffOptions::new();
        opts.pathspec(relative);
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
        if diff.deltas().len() == 0 {
            continue;
        }

        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_default();
        revisions.push(Revision {
            hash: format!("{:.7}", commit.id()),
            message: commit
                .message()
                .unwrap_or("")
                .lines()
                .next()
                .unwrap_or("")
                .to_string(),
            timestamp,
        });
    }

    Ok(revisions)
}
