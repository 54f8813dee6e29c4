//! Blocking child-process execution with a hard timeout.
//!
//! Stdout and stderr are drained on dedicated threads so a chatty child can
//! never deadlock on a full pipe. The calling thread keeps sole ownership of
//! the `Child` and polls `try_wait` until the deadline, so a kill can only
//! ever target a process that has not been reaped.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a finished (or killed) child left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Spawn `cmd` with stdin closed and both output streams captured, blocking
/// until it exits or `timeout` elapses. On timeout the process is killed and
/// `timed_out` is set; output captured so far is discarded.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<ProcessOutput> {
    let start = Instant::now();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stdout_handle {
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stderr_handle {
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });

    let status = match wait_until(&mut child, start + timeout)? {
        Some(status) => status,
        None => {
            // Still unreaped here, so the pid cannot have been recycled.
            let _ = child.kill();
            let _ = child.wait();
            return Ok(ProcessOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(ProcessOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        timed_out: false,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Poll for exit until `deadline`. `None` means the child is still running.
fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
