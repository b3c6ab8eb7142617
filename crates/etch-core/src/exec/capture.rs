//! Subprocess execution with bounded output capture
//!
//! Commands run under `sh -c` with stdout and stderr piped to reader threads.
//! Collection stops at EOF on both pipes or when the deadline passes, so a
//! restarted daemon that keeps the inherited pipes open cannot hang the run.
//! Past the deadline the readers stop and close their ends of the pipes.

use std::io::Read;
use std::os::fd::AsRawFd;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CHUNK: usize = 8 * 1024;
/// How often a reader waiting on a quiet pipe checks whether to stop.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of one captured command.
#[derive(Debug)]
pub struct Captured {
    /// `None` when the shell had to be killed at the deadline
    pub status: Option<ExitStatus>,
    /// Interleaved stdout and stderr, lossily decoded
    pub output: String,
    pub timed_out: bool,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    pub fn describe_status(&self) -> String {
        match self.status {
            Some(status) => match status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            },
            None => "timed out".to_string(),
        }
    }
}

/// Run `command` through the shell and capture its output.
pub fn run_captured(command: &str, path_env: Option<&str>, timeout: Duration) -> std::io::Result<Captured> {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(path) = path_env {
        cmd.env("PATH", path);
    }

    let mut child = cmd.spawn()?;
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, tx.clone(), Arc::clone(&stop)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, tx.clone(), Arc::clone(&stop)));
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let mut buffer = Vec::new();
    let mut timed_out = false;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(chunk) => buffer.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                timed_out = true;
                break;
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        let _ = reader.join();
    }

    let status = if timed_out {
        tracing::warn!(%command, timeout_secs = timeout.as_secs(), "Output capture timed out");
        reap_after_timeout(&mut child)?
    } else {
        Some(child.wait()?)
    };

    Ok(Captured {
        status,
        output: String::from_utf8_lossy(&buffer).into_owned(),
        timed_out,
    })
}

/// Forward chunks from `source` until EOF or until `stop` is set. The pipe
/// is closed when the thread ends.
fn spawn_reader<R>(mut source: R, tx: mpsc::Sender<Vec<u8>>, stop: Arc<AtomicBool>) -> JoinHandle<()>
where
    R: Read + AsRawFd + Send + 'static,
{
    thread::spawn(move || {
        let mut chunk = [0u8; CHUNK];
        while !stop.load(Ordering::Relaxed) {
            if !readable(&source, POLL_INTERVAL) {
                continue;
            }
            match source.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Whether a read on `source` would not block (data, EOF or error).
fn readable(source: &impl AsRawFd, wait: Duration) -> bool {
    let mut fd = libc::pollfd {
        fd: source.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(wait.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `fd` is a single valid pollfd that outlives the call.
    let ready = unsafe { libc::poll(&mut fd, 1, millis) };
    ready > 0
}

/// The shell may have exited with a descendant still holding the pipes.
fn reap_after_timeout(child: &mut Child) -> std::io::Result<Option<ExitStatus>> {
    if let Some(status) = child.try_wait()? {
        return Ok(Some(status));
    }
    child.kill()?;
    child.wait()?;
    Ok(None)
}
