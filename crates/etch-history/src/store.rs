//! Git-backed revision store over the history working tree.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use fs2::FileExt;
use git2::{Commit, ErrorCode, Repository, Signature};

use crate::revision::{self, Revision};
use crate::{Error, Result};

const LOCK_FILE: &str = "etch.lock";
const AUTHOR_NAME: &str = "etch";
const AUTHOR_EMAIL: &str = "etch@localhost";

/// Revision store rooted at a history working tree.
pub struct HistoryStore {
    repo: Repository,
    workdir: PathBuf,
    store_dir: PathBuf,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("workdir", &self.workdir)
            .field("store_dir", &self.store_dir)
            .finish()
    }
}

impl HistoryStore {
    /// Open the store for `workdir`, initialising it on first use.
    pub fn open(workdir: &Path) -> Result<Self> {
        let store_dir = workdir.join(etch_fs::layout::HISTORY_STORE_DIR);
        fs::create_dir_all(&store_dir).map_err(|e| Error::io(&store_dir, e))?;

        let repo = match Repository::open_bare(&store_dir) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                tracing::debug!(store = %store_dir.display(), "Initialising history store");
                Repository::init_bare(&store_dir)?
            }
            Err(e) => return Err(e.into()),
        };
        repo.set_workdir(workdir, false)?;

        Ok(Self {
            repo,
            workdir: workdir.to_path_buf(),
            store_dir,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Absolute path of the working-tree entry for `relative`.
    pub fn entry_path(&self, relative: &Path) -> Result<PathBuf> {
        check_relative(relative)?;
        Ok(self.workdir.join(relative))
    }

    /// Record the current state of `relative` in the working tree.
    ///
    /// A missing entry is recorded as a removal. Returns the short hash of the
    /// new revision, or `None` when nothing changed.
    pub fn record(&self, relative: &Path, message: &str) -> Result<Option<String>> {
        check_relative(relative)?;
        let _lock = self.lock()?;

        let mut index = self.repo.index()?;
        let present = fs::symlink_metadata(self.workdir.join(relative)).is_ok();
        if present {
            index.add_path(relative)?;
        } else {
            index.remove_path(relative)?;
        }
        index.write()?;
        let tree_id = index.write_tree()?;

        let parent = self.head_commit()?;
        if let Some(parent) = &parent
            && parent.tree_id() == tree_id
        {
            tracing::debug!(entry = %relative.display(), "History entry unchanged");
            return Ok(None);
        }

        let signature = Signature::now(AUTHOR_NAME, AUTHOR_EMAIL)?;
        let tree = self.repo.find_tree(tree_id)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        let hash = format!("{:.7}", oid);
        tracing::debug!(entry = %relative.display(), %hash, "Recorded history revision");
        Ok(Some(hash))
    }

    /// Revisions touching `relative`, newest first.
    pub fn revisions(&self, relative: &Path, max_count: usize) -> Result<Vec<Revision>> {
        check_relative(relative)?;
        revision::revisions_touching(&self.repo, relative, max_count)
    }

    /// Content of `relative` in the latest revision, if recorded.
    pub fn latest(&self, relative: &Path) -> Result<Option<Vec<u8>>> {
        check_relative(relative)?;
        let Some(commit) = self.head_commit()? else {
            return Ok(None);
        };
        let entry = match commit.tree()?.get_path(relative) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = self.repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn lock(&self) -> Result<File> {
        let path = self.store_dir.join(LOCK_FILE);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        file.lock_exclusive().map_err(|e| Error::io(&path, e))?;
        Ok(file)
    }
}

fn check_relative(relative: &Path) -> Result<()> {
    if relative.to_str().is_none() {
        return Err(Error::NonUtf8Path {
            path: relative.to_path_buf(),
        });
    }
    match relative.components().next() {
        Some(Component::Normal(first)) if first != etch_fs::layout::HISTORY_STORE_DIR => Ok(()),
        _ => Err(Error::ReservedPath {
            path: relative.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_skips_unchanged_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        let entry = store.entry_path(Path::new("etc/motd")).unwrap();
        fs::create_dir_all(entry.parent().unwrap()).unwrap();
        fs::write(&entry, "old\n").unwrap();

        assert!(store.record(Path::new("etc/motd"), "first").unwrap().is_some());
        assert!(store.record(Path::new("etc/motd"), "again").unwrap().is_none());
    }

    #[test]
    fn reserved_and_absolute_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.entry_path(Path::new("RCS/config")),
            Err(Error::ReservedPath { .. })
        ));
        assert!(store.entry_path(Path::new("/etc/motd")).is_err());
    }

    #[test]
    fn reopening_keeps_revisions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = HistoryStore::open(dir.path()).unwrap();
            fs::write(dir.path().join("motd"), "a").unwrap();
            store.record(Path::new("motd"), "a").unwrap();
        }
        let store = HistoryStore::open(dir.path()).unwrap();
        assert_eq!(store.latest(Path::new("motd")).unwrap(), Some(b"a".to_vec()));
    }
}
