//! Scoped scheduling-priority reset
//!
//! The agent may run niced (e.g. from cron). Daemons restarted by `post`
//! or `command` steps must not inherit that, so those steps run inside a
//! [`NormalPriority`] scope which restores the previous value on drop.

/// Priority is back to its previous value when this is dropped.
#[derive(Debug)]
pub struct NormalPriority {
    previous: Option<i32>,
}

impl NormalPriority {
    /// Reset this process to priority 0, best effort.
    pub fn enter() -> Self {
        let current = current_priority();
        if current == 0 {
            return Self { previous: None };
        }
        match set_priority(0) {
            Ok(()) => {
                tracing::debug!(previous = current, "Restored normal scheduling priority");
                Self {
                    previous: Some(current),
                }
            }
            Err(e) => {
                tracing::debug!(current, error = %e, "Could not reset scheduling priority");
                Self { previous: None }
            }
        }
    }
}

impl Drop for NormalPriority {
    fn drop(&mut self) {
        if let Some(previous) = self.previous
            && let Err(e) = set_priority(previous)
        {
            tracing::warn!(previous, error = %e, "Failed to reinstate scheduling priority");
        }
    }
}

/// Current nice value of this process.
///
/// `getpriority` can legitimately return -1, and with `who == 0` it cannot
/// fail, so the return value is taken as-is.
pub fn current_priority() -> i32 {
    // SAFETY: getpriority has no memory-safety preconditions.
    unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) }
}

fn set_priority(value: i32) -> std::io::Result<()> {
    // SAFETY: setpriority has no memory-safety preconditions.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, value) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
