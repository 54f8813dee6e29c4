//! Transport that actually reaches remote hosts.
//!
//! A channel receives the remote argv as a vector and is responsible for
//! getting exactly that argv to the remote process. Both shipped channels
//! hand the command to a POSIX shell (sshd always does), so every element is
//! single-quoted by [`join_argv`] first.

use crate::process::{run_with_timeout, ProcessOutput};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Channel contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ChannelRequest<'a> {
    pub cluster: &'a str,
    pub host: &'a str,
    pub user: &'a str,
    pub argv: &'a [String],
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{0}")]
    AuthRejected(String),
    #[error("{0}")]
    Unreachable(String),
    #[error("failed to start channel: {0}")]
    Spawn(String),
}

pub trait RemoteChannel: Send + Sync {
    /// Run `req.argv` on `req.host`, blocking for at most `timeout`.
    /// A nonzero remote exit is `Ok`; only transport-level failures are `Err`.
    fn exec(&self, req: &ChannelRequest<'_>, timeout: Duration)
        -> Result<ProcessOutput, ChannelError>;

    /// List hosts reachable in `cluster` as a JSON array of node objects.
    fn list_hosts(&self, cluster: &str, timeout: Duration) -> Result<ProcessOutput, ChannelError>;
}

// ---------------------------------------------------------------------------
// Quoting
// ---------------------------------------------------------------------------

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | ',' | '+' | '@' | '%')
}

/// Quote `arg` so a POSIX shell yields it back as exactly one word.
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Join an argv into a single shell command line, one quoted word per element.
pub fn join_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Teleport channel
// ---------------------------------------------------------------------------

/// Prefix `tsh` puts on its own diagnostics. Remote tools write lowercase
/// `error:` or their own formats, so matching is case-sensitive.
const GATEWAY_PREFIX: &str = "ERROR:";

const AUTH_MARKERS: &[&str] = &[
    "not logged in",
    "please login",
    "please log in",
    "access denied to",
    "ssh: handshake failed",
    "ssh: unable to authenticate",
    "ssh: cert has expired",
];

const UNREACHABLE_MARKERS: &[&str] = &[
    "connection refused",
    "cannot connect",
    "failed connecting",
    "no route to host",
    "could not resolve",
    "node not found",
    "not found in cluster",
];

/// Reaches hosts through a Teleport gateway via `tsh ssh --cluster=<c> user@host`.
#[derive(Debug, Clone)]
pub struct TshChannel {
    binary: PathBuf,
}

impl TshChannel {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Explicit path if configured, else `tsh` on PATH, else the conventional
    /// install location.
    pub fn locate(explicit: Option<&str>) -> Self {
        if let Some(p) = explicit {
            return Self::new(p);
        }
        match which::which("tsh") {
            Ok(p) => Self::new(p),
            Err(_) => Self::new("/usr/local/bin/tsh"),
        }
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    fn run(&self, cmd: Command, timeout: Duration) -> Result<ProcessOutput, ChannelError> {
        let out = run_with_timeout(cmd, timeout).map_err(|e| {
            ChannelError::Spawn(format!("{}: {e}", self.binary.display()))
        })?;
        match classify_failure(&out) {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

/// Separate gateway failures from the remote command's own nonzero exit.
/// Only `tsh`'s own `ERROR:` lines are considered, so a remote tool printing
/// "access denied" or "connection refused" keeps its output as data.
fn classify_failure(out: &ProcessOutput) -> Option<ChannelError> {
    if out.timed_out || out.exit_code == Some(0) {
        return None;
    }
    let gateway_lines = out
        .stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with(GATEWAY_PREFIX));
    for line in gateway_lines {
        let lower = line.to_lowercase();
        if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
            return Some(ChannelError::AuthRejected(out.stderr.trim().to_string()));
        }
        if UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m)) {
            return Some(ChannelError::Unreachable(line.to_string()));
        }
    }
    None
}

impl RemoteChannel for TshChannel {
    fn exec(
        &self,
        req: &ChannelRequest<'_>,
        timeout: Duration,
    ) -> Result<ProcessOutput, ChannelError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("ssh")
            .arg(format!("--cluster={}", req.cluster))
            .arg(format!("{}@{}", req.user, req.host))
            .arg(join_argv(req.argv));
        self.run(cmd, timeout)
    }

    fn list_hosts(&self, cluster: &str, timeout: Duration) -> Result<ProcessOutput, ChannelError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("ls")
            .arg(format!("--cluster={cluster}"))
            .arg("--format=json");
        self.run(cmd, timeout)
    }
}

// ---------------------------------------------------------------------------
// Loopback channel
// ---------------------------------------------------------------------------

/// Runs commands on the local machine through `sh -c`, mirroring how sshd
/// hands a command line to the remote login shell. Cluster, host and user
/// are ignored. Useful for development and for exercising quoting end to end.
#[derive(Debug, Clone, Default)]
pub struct LocalShellChannel;

impl RemoteChannel for LocalShellChannel {
    fn exec(
        &self,
        req: &ChannelRequest<'_>,
        timeout: Duration,
    ) -> Result<ProcessOutput, ChannelError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(join_argv(req.argv));
        run_with_timeout(cmd, timeout).map_err(|e| ChannelError::Spawn(e.to_string()))
    }

    fn list_hosts(&self, _cluster: &str, _timeout: Duration) -> Result<ProcessOutput, ChannelError> {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let body = serde_json::json!([
            {
                "kind": "node",
                "metadata": { "name": "local", "labels": { "env": "local" } },
                "spec": { "hostname": hostname, "addr": "127.0.0.1:22" }
            }
        ]);
        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: body.to_string(),
            stderr: String::new(),
            timed_out: false,
            duration_ms: 0,
        })
    }
}
