//! On-disk layout of the agent's state directory
//!
//! ```text
//! <base_dir>/
//!   orig/            original-state archive, mirrors resource paths
//!   history/         history log working tree, mirrors resource paths
//!   history/RCS/     revision store for the history log
//!   locks/           one lock file per resource or command
//!   requests/        local request side-channel, one directory per resource
//!   disable_etch     marker that disables the agent
//! ```
//!
//! Resource names are absolute paths as seen by the authority. When a test
//! root is configured, every live path is mapped underneath it.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Name of the archive directory
pub const ORIG_DIR: &str = "orig";
/// Name of the history working tree
pub const HISTORY_DIR: &str = "history";
/// Name of the revision store inside the history working tree
pub const HISTORY_STORE_DIR: &str = "RCS";
/// Name of the lock directory
pub const LOCKS_DIR: &str = "locks";
/// Name of the local request side-channel directory
pub const REQUESTS_DIR: &str = "requests";
/// Marker file that disables the agent
pub const DISABLE_MARKER: &str = "disable_etch";

/// Resolved on-disk layout for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLayout {
    base_dir: PathBuf,
    test_root: Option<PathBuf>,
}

impl AgentLayout {
    /// Create a layout rooted at `base_dir` with live paths used verbatim.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            test_root: None,
        }
    }

    /// Map every live resource path under `test_root`.
    pub fn with_test_root(mut self, test_root: impl Into<PathBuf>) -> Self {
        self.test_root = Some(test_root.into());
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn test_root(&self) -> Option<&Path> {
        self.test_root.as_deref()
    }

    pub fn orig_dir(&self) -> PathBuf {
        self.base_dir.join(ORIG_DIR)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.base_dir.join(HISTORY_DIR)
    }

    pub fn history_store_dir(&self) -> PathBuf {
        self.history_dir().join(HISTORY_STORE_DIR)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.base_dir.join(LOCKS_DIR)
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.base_dir.join(REQUESTS_DIR)
    }

    pub fn disable_marker(&self) -> PathBuf {
        self.base_dir.join(DISABLE_MARKER)
    }

    /// Create the state directories (mode 0700) if they are missing.
    pub fn ensure(&self) -> Result<()> {
        let mut builder = DirBuilder::new();
        builder.recursive(true).mode(0o700);
        for dir in [
            self.orig_dir(),
            self.history_dir(),
            self.locks_dir(),
            self.requests_dir(),
        ] {
            builder.create(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        Ok(())
    }

    /// Live filesystem path of a resource, honouring the test root.
    pub fn live_path(&self, name: &str) -> Result<PathBuf> {
        let relative = relative_name(name)?;
        Ok(match &self.test_root {
            Some(root) => root.join(relative),
            None => PathBuf::from(name),
        })
    }

    /// Path of `name` mirrored under one of the state directories.
    pub fn mirror(&self, root: &Path, name: &str) -> Result<PathBuf> {
        Ok(root.join(relative_name(name)?))
    }

    /// Directory holding the local request fragments of a resource.
    pub fn requests_for(&self, name: &str) -> Result<PathBuf> {
        self.mirror(&self.requests_dir(), name)
    }
}

/// Validate a resource name and return it relative to `/`.
///
/// Names must be absolute and must not contain `..` components.
pub fn relative_name(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if !path.is_absolute() {
        return Err(Error::InvalidResourceName {
            name: name.to_string(),
        });
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(Error::InvalidResourceName {
                    name: name.to_string(),
                });
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(Error::InvalidResourceName {
            name: name.to_string(),
        });
    }
    Ok(out)
}
