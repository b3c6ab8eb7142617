//! [`TestHost`]: an isolated agent base directory and managed filesystem.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use etch_fs::AgentLayout;
use tempfile::TempDir;

/// Temporary host with `base/` for agent state and `root/` standing in for `/`.
///
/// # Example
///
/// ```rust,no_run
/// use etch_test_utils::TestHost;
///
/// let host = TestHost::new();
/// host.write("/etc/motd", "old\n");
/// assert_eq!(host.read("/etc/motd"), "old\n");
/// ```
pub struct TestHost {
    temp_dir: TempDir,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("base")).unwrap();
        fs::create_dir_all(temp_dir.path().join("root")).unwrap();
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn base_dir(&self) -> PathBuf {
        self.path().join("base")
    }

    pub fn test_root(&self) -> PathBuf {
        self.path().join("root")
    }

    pub fn layout(&self) -> AgentLayout {
        AgentLayout::new(self.base_dir()).with_test_root(self.test_root())
    }

    /// Live path of a resource name such as `/etc/motd`.
    pub fn live(&self, name: &str) -> PathBuf {
        self.test_root().join(name.trim_start_matches('/'))
    }

    /// Write a live file, creating its parent directories.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.live(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.live(name)).unwrap()
    }

    pub fn exists(&self, name: &str) -> bool {
        fs::symlink_metadata(self.live(name)).is_ok()
    }

    pub fn mode(&self, name: &str) -> u32 {
        fs::symlink_metadata(self.live(name)).unwrap().permissions().mode() & 0o7777
    }

    pub fn set_mode(&self, name: &str, mode: u32) {
        fs::set_permissions(self.live(name), fs::Permissions::from_mode(mode)).unwrap();
    }

    /// Numeric uid of the test process, usable as an `owner` that never
    /// requires privilege.
    pub fn uid(&self) -> String {
        fs::metadata(self.path()).unwrap().uid().to_string()
    }

    pub fn gid(&self) -> String {
        fs::metadata(self.path()).unwrap().gid().to_string()
    }

    /// Path of a file under the agent base directory.
    pub fn state(&self, relative: &str) -> PathBuf {
        self.base_dir().join(relative)
    }

    /// Shell command that appends `line` to a log file under the host, for
    /// counting how often commands ran.
    pub fn marker_command(&self, log: &str, line: &str) -> String {
        format!("echo {line} >> {}", self.path().join(log).display())
    }

    /// Lines written by [`TestHost::marker_command`].
    pub fn marker_lines(&self, log: &str) -> Vec<String> {
        fs::read_to_string(self.path().join(log))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Disable the agent with `reason`.
    pub fn disable(&self, reason: &str) {
        fs::write(self.layout().disable_marker(), reason).unwrap();
    }
}
