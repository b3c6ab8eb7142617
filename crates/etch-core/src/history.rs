//! History log
//!
//! Every resource has one entry in the history working tree
//! (`history/<path>.HISTORY`): the file content for regular files, a short
//! metadata description otherwise. The entry is recorded before and after
//! each change, and bootstrapped from the archived original the first time
//! the resource changes.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use etch_fs::{AgentLayout, NodeKind, NodeState, io, meta};
use etch_history::HistoryStore;

use crate::archive::{Archive, OriginalRecord};
use crate::{Error, Result};

const ENTRY_SUFFIX: &str = ".HISTORY";
/// Entries never carry setuid, setgid or sticky bits.
const ENTRY_MODE_MASK: u32 = 0o777;

#[derive(Debug)]
pub struct HistoryLog {
    store: HistoryStore,
}

impl HistoryLog {
    pub fn open(layout: &AgentLayout) -> Result<Self> {
        Ok(Self {
            store: HistoryStore::open(&layout.history_dir())?,
        })
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Working-tree path (relative to the history directory) for `name`.
    pub fn entry_relative(name: &str) -> Result<PathBuf> {
        let mut os = etch_fs::relative_name(name)?.into_os_string();
        os.push(ENTRY_SUFFIX);
        Ok(PathBuf::from(os))
    }

    /// Seed the log with the archived original, once.
    ///
    /// Returns `true` when this call created the entry, which marks the
    /// first change etch ever makes to the resource.
    pub fn bootstrap(&self, name: &str, archive: &Archive) -> Result<bool> {
        let relative = Self::entry_relative(name)?;
        if !self.store.revisions(&relative, 1)?.is_empty() {
            return Ok(false);
        }
        let Some(record) = archive.record(name)? else {
            return Ok(false);
        };
        let (content, mode) = match &record {
            OriginalRecord::Copy(path) => {
                let state = meta::probe(path)?;
                (entry_content(path, &state)?, state.mode)
            }
            OriginalRecord::DirectoryRecord(path) => {
                let state = meta::probe(path)?;
                (describe(&NodeState { kind: NodeKind::Directory, ..state }), state.mode)
            }
            OriginalRecord::DirectoryTar(_) | OriginalRecord::Provisional(_) => {
                (b"directory (archived)\n".to_vec(), 0o700)
            }
            OriginalRecord::Absent(_) => (b"missing\n".to_vec(), 0o600),
        };
        self.write_entry(&relative, &content, mode)?;
        self.store.record(&relative, &format!("{name}: original"))?;
        Ok(true)
    }

    /// Record the live state of `name`.
    ///
    /// The entry's mode is the intersection of the original's mode (when
    /// known) and the live mode, plus owner read/write. Group and other
    /// never get more than either side grants.
    pub fn record(&self, name: &str, live: &Path, original_mode: Option<u32>, message: &str) -> Result<()> {
        let relative = Self::entry_relative(name)?;
        let state = meta::probe(live)?;
        let content = entry_content(live, &state)?;
        let live_mode = if state.exists() { state.mode } else { 0o600 };
        let mode = original_mode.map_or(live_mode, |orig| orig & live_mode);

        self.write_entry(&relative, &content, mode)?;
        if let Some(hash) = self.store.record(&relative, &format!("{name}: {message}"))? {
            tracing::debug!(resource = %name, %hash, %message, "History recorded");
        }
        Ok(())
    }

    fn write_entry(&self, relative: &Path, content: &[u8], mode: u32) -> Result<()> {
        let path = self.store.entry_path(relative)?;
        let staged = io::StagedFile::create(&path, content)?;
        // Owner needs read/write access to maintain the entry.
        staged.set_mode((mode & ENTRY_MODE_MASK) | 0o600)?;
        staged.commit()?;
        Ok(())
    }
}

fn entry_content(path: &Path, state: &NodeState) -> Result<Vec<u8>> {
    match state.kind {
        NodeKind::File => fs::read(path).map_err(|e| Error::io(path, e)),
        _ => Ok(describe(state)),
    }
}

fn describe(state: &NodeState) -> Vec<u8> {
    let mut text = String::new();
    match state.kind {
        NodeKind::Missing => text.push_str("missing\n"),
        NodeKind::Symlink => {
            let dest = state
                .link_target
                .as_deref()
                .map(|d| d.display().to_string())
                .unwrap_or_default();
            let _ = writeln!(text, "symlink -> {dest}");
        }
        kind => {
            let _ = writeln!(text, "{kind}");
            let _ = writeln!(text, "mode {:04o}", state.mode);
        }
    }
    if state.exists() {
        let _ = writeln!(text, "owner {} group {}", state.uid, state.gid);
    }
    text.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::SaveIntent;
    use pretty_assertions::assert_eq;

    fn setup() -> (tempfile::TempDir, AgentLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = AgentLayout::new(dir.path().join("base")).with_test_root(dir.path().join("root"));
        layout.ensure().unwrap();
        (dir, layout)
    }

    #[test]
    fn bootstrap_then_updates_form_a_trail() {
        let (_dir, layout) = setup();
        let archive = Archive::new(&layout);
        let log = HistoryLog::open(&layout).unwrap();
        let live = layout.live_path("/etc/motd").unwrap();
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "old\n").unwrap();

        archive.save("/etc/motd", &live, SaveIntent::Replace).unwrap();
        assert!(log.bootstrap("/etc/motd", &archive).unwrap());
        assert!(!log.bootstrap("/etc/motd", &archive).unwrap());
        log.record("/etc/motd", &live, None, "before update").unwrap();
        fs::write(&live, "hello\n").unwrap();
        log.record("/etc/motd", &live, None, "after update").unwrap();

        let relative = HistoryLog::entry_relative("/etc/motd").unwrap();
        let revisions = log.store().revisions(&relative, 10).unwrap();
        let messages: Vec<_> = revisions.iter().map(|r| r.message.as_str()).collect();
        // "before update" matched the original and produced no revision
        assert_eq!(messages, vec!["/etc/motd: after update", "/etc/motd: original"]);
        assert_eq!(log.store().latest(&relative).unwrap(), Some(b"hello\n".to_vec()));
    }

    #[test]
    fn entry_mode_is_intersection_of_original_and_live() {
        let (_dir, layout) = setup();
        let log = HistoryLog::open(&layout).unwrap();
        let live = layout.live_path("/etc/shadow").unwrap();
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "secret").unwrap();
        meta::chmod(&live, 0o644).unwrap();

        log.record("/etc/shadow", &live, Some(0o640), "after update").unwrap();

        let entry = layout.history_dir().join("etc/shadow.HISTORY");
        assert_eq!(meta::probe(&entry).unwrap().mode, 0o640);
    }

    #[test]
    fn entry_mode_keeps_owner_access_only() {
        let (_dir, layout) = setup();
        let log = HistoryLog::open(&layout).unwrap();
        let live = layout.live_path("/etc/ssh/host_key").unwrap();
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "key").unwrap();
        meta::chmod(&live, 0o444).unwrap();

        log.record("/etc/ssh/host_key", &live, Some(0o400), "after update").unwrap();

        let entry = layout.history_dir().join("etc/ssh/host_key.HISTORY");
        assert_eq!(meta::probe(&entry).unwrap().mode, 0o600);
    }

    #[test]
    fn non_regular_resources_are_described() {
        let (_dir, layout) = setup();
        let log = HistoryLog::open(&layout).unwrap();
        let live = layout.live_path("/etc/alternatives/editor").unwrap();
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink("/usr/bin/vim", &live).unwrap();

        log.record("/etc/alternatives/editor", &live, None, "after update").unwrap();

        let entry = layout.history_dir().join("etc/alternatives/editor.HISTORY");
        let text = fs::read_to_string(entry).unwrap();
        assert!(text.starts_with("symlink -> /usr/bin/vim\n"), "{text}");
    }

    #[test]
    fn directory_and_child_entries_do_not_collide() {
        let (_dir, layout) = setup();
        let log = HistoryLog::open(&layout).unwrap();
        let dir_live = layout.live_path("/etc/app").unwrap();
        fs::create_dir_all(&dir_live).unwrap();
        fs::write(dir_live.join("conf"), "x").unwrap();

        log.record("/etc/app", &dir_live, None, "after update").unwrap();
        log.record("/etc/app/conf", &dir_live.join("conf"), None, "after update").unwrap();

        assert!(layout.history_dir().join("etc/app.HISTORY").is_file());
        assert!(layout.history_dir().join("etc/app/conf.HISTORY").is_file());
    }
}
