//! Per-resource exclusive locks
//!
//! A lock is a file under the lock directory, created with `O_EXCL` and
//! holding the pid of the owning process. Contention is handled by a bounded
//! retry loop; release checks the pid before removing the file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::{Error, Result};

/// Default number of acquisition attempts before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 30;
/// Default pause between acquisition attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
/// Default age after which a lock file is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

/// Creates and removes lock files in one directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
    attempts: u32,
    interval: Duration,
    pid: u32,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
            pid: std::process::id(),
        }
    }

    /// Override the retry budget.
    pub fn with_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for `name`.
    ///
    /// Names are percent-encoded so a path such as `/etc/motd` becomes a
    /// single flat file name.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
        self.dir.join(encoded)
    }

    /// Acquire the lock for `name`, retrying on contention.
    pub fn acquire(&self, name: &str) -> Result<LockGuard> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.lock_path(name);

        for attempt in 1..=self.attempts {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", self.pid).map_err(|e| Error::io(&path, e))?;
                    tracing::debug!(lock = %name, attempt, "Acquired lock");
                    return Ok(LockGuard {
                        name: name.to_string(),
                        path,
                        pid: self.pid,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(
                        lock = %name,
                        attempt,
                        holder = %read_holder(&path),
                        "Lock busy"
                    );
                    if attempt < self.attempts {
                        std::thread::sleep(self.interval);
                    }
                }
                Err(e) => return Err(Error::io(&path, e)),
            }
        }

        Err(Error::LockTimeout {
            name: name.to_string(),
            holder: read_holder(&path),
            attempts: self.attempts,
        })
    }

    /// Remove lock files older than `max_age`, or every lock file when `force` is set.
    ///
    /// Returns the number of lock files removed.
    pub fn clean_stale(&self, max_age: Duration, force: bool) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io(&self.dir, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let path = entry.path();
            let modified = entry
                .metadata()
                .and_then(|md| md.modified())
                .map_err(|e| Error::io(&path, e))?;
            let age = now.duration_since(modified).unwrap_or_default();
            if force || age > max_age {
                tracing::info!(lock = %path.display(), age_secs = age.as_secs(), force, "Removing old lock");
                fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Holds one lock until released or dropped.
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, verifying this process still owns it.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        release_file(&self.name, &self.path, self.pid)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = release_file(&self.name, &self.path, self.pid) {
            tracing::error!(lock = %self.name, error = %e, "Failed to release lock");
        }
    }
}

fn release_file(name: &str, path: &Path, pid: u32) -> Result<()> {
    let holder = match fs::read_to_string(path) {
        Ok(holder) => holder.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::LockMissing {
                name: name.to_string(),
            });
        }
        Err(e) => return Err(Error::io(path, e)),
    };
    if holder != pid.to_string() {
        return Err(Error::LockNotOwned {
            name: name.to_string(),
            holder,
            pid,
        });
    }
    fs::remove_file(path).map_err(|e| Error::io(path, e))?;
    tracing::debug!(lock = %name, "Released lock");
    Ok(())
}

fn read_holder(path: &Path) -> String {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
