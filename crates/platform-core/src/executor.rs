//! The single remote-execution primitive every infrastructure tool composes.
//!
//! `execute` fails closed: a cluster outside the allow-list, a malformed host
//! or a privileged user is rejected before the channel is touched. Nonzero
//! exits and timeouts come back as a [`CommandResult`] so callers can read
//! stdout/stderr; only gateway-level failures are `Err`.

use crate::channel::{ChannelError, ChannelRequest, RemoteChannel, TshChannel};
use crate::config::Config;
use crate::error::{ErrorKind, PlatformError, Result};
use crate::process::ProcessOutput;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// ---------------------------------------------------------------------------
// RemoteTarget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    pub cluster_identity: String,
    pub host: String,
    pub user: String,
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{} ({})", self.user, self.host, self.cluster_identity)
    }
}

fn host_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,252}$").expect("valid regex"))
}

fn user_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9._-]{0,63}$").expect("valid regex"))
}

// ---------------------------------------------------------------------------
// RemoteCommand
// ---------------------------------------------------------------------------

/// A remote invocation as an argument vector. The channel guarantees the
/// remote process observes exactly these words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommand {
    pub argv: Vec<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn from_argv(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

impl std::fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::channel::join_argv(&self.argv))
    }
}

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// True iff the process exited 0 and did not time out.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub message: String,
    /// Populated only on failure. Advisory text, never executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_hint: Option<String>,
    pub duration_ms: u64,
}

impl CommandResult {
    fn from_output(out: ProcessOutput, target: &RemoteTarget, timeout: Duration) -> Self {
        let success = out.success();
        let (message, remediation_hint) = if success {
            ("Command executed successfully".to_string(), None)
        } else if out.timed_out {
            (
                format!(
                    "Command timed out after {}s on {target}; the process was killed",
                    timeout.as_secs()
                ),
                Some("Retry with a longer timeout_seconds if the command is expected to be slow".to_string()),
            )
        } else {
            (
                match out.exit_code {
                    Some(code) => format!("Command failed with exit code {code}"),
                    None => "Command was terminated by a signal".to_string(),
                },
                Some("Check stderr for the remote tool's error details".to_string()),
            )
        };
        Self {
            success,
            stdout: out.stdout,
            stderr: out.stderr,
            exit_code: out.exit_code,
            timed_out: out.timed_out,
            message,
            remediation_hint,
            duration_ms: out.duration_ms,
        }
    }

    /// `None` on success, else the failure kind this result represents.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        if self.success {
            None
        } else if self.timed_out {
            Some(ErrorKind::Timeout)
        } else {
            Some(ErrorKind::Execution)
        }
    }

    /// Lift a timeout or nonzero exit into the matching error, for callers
    /// that need the command to have succeeded before parsing its output.
    pub fn require_success(self, target: &RemoteTarget, timeout: Duration) -> Result<Self> {
        if self.timed_out {
            return Err(PlatformError::Timeout {
                target: target.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        if !self.success {
            return Err(PlatformError::Execution {
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr.trim().to_string(),
            });
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// RemoteExecutor
// ---------------------------------------------------------------------------

pub struct RemoteExecutor {
    config: Config,
    channel: Arc<dyn RemoteChannel>,
}

impl RemoteExecutor {
    /// Fails with `InvalidConfig` if the configuration has error-level findings.
    pub fn new(config: Config, channel: Arc<dyn RemoteChannel>) -> Result<Self> {
        config.ensure_valid()?;
        Ok(Self { config, channel })
    }

    /// Executor over Teleport, locating `tsh` from config or PATH.
    pub fn teleport(config: Config) -> Result<Self> {
        let channel = TshChannel::locate(config.tsh_binary.as_deref());
        Self::new(config, Arc::new(channel))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.config.default_timeout_seconds)
    }

    /// Build a target, defaulting `user` to the configured account.
    pub fn target(&self, cluster: &str, host: &str, user: Option<&str>) -> Result<RemoteTarget> {
        let target = RemoteTarget {
            cluster_identity: cluster.to_string(),
            host: host.to_string(),
            user: user.unwrap_or(&self.config.default_user).to_string(),
        };
        self.validate_target(&target)?;
        Ok(target)
    }

    pub fn ensure_cluster(&self, cluster: &str) -> Result<()> {
        if self.config.is_allowed_cluster(cluster) {
            Ok(())
        } else {
            Err(PlatformError::InvalidTarget(format!(
                "cluster '{cluster}' is not in the allow-list (allowed: {})",
                self.config.clusters.join(", ")
            )))
        }
    }

    pub fn validate_target(&self, target: &RemoteTarget) -> Result<()> {
        self.ensure_cluster(&target.cluster_identity)?;
        if !host_re().is_match(&target.host) {
            return Err(PlatformError::InvalidTarget(format!(
                "invalid host '{}'",
                target.host
            )));
        }
        if !user_re().is_match(&target.user) {
            return Err(PlatformError::InvalidTarget(format!(
                "invalid user '{}'",
                target.user
            )));
        }
        if self.config.is_forbidden_user(&target.user) {
            return Err(PlatformError::InvalidTarget(format!(
                "user '{}' is privileged; connect as a named non-privileged account",
                target.user
            )));
        }
        Ok(())
    }

    /// Run `command` on `target`, blocking until it exits or `timeout` elapses.
    ///
    /// This reaches a real host and can change its state. No retries.
    pub fn execute(
        &self,
        target: &RemoteTarget,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.validate_target(target)?;
        match command.program() {
            Some(p) if !p.trim().is_empty() => {}
            _ => {
                return Err(PlatformError::InvalidArgument(
                    "command cannot be empty".to_string(),
                ))
            }
        }

        tracing::info!(
            cluster = %target.cluster_identity,
            host = %target.host,
            user = %target.user,
            command = %command,
            timeout_s = timeout.as_secs(),
            "remote exec"
        );

        let req = ChannelRequest {
            cluster: &target.cluster_identity,
            host: &target.host,
            user: &target.user,
            argv: &command.argv,
        };
        let out = self
            .channel
            .exec(&req, timeout)
            .map_err(|e| self.channel_error(e, &target.cluster_identity, &target.to_string()))?;

        let result = CommandResult::from_output(out, target, timeout);
        if result.timed_out {
            tracing::warn!(target = %target, "remote command timed out");
        } else if !result.success {
            tracing::debug!(target = %target, exit_code = ?result.exit_code, "remote command exited nonzero");
        }
        Ok(result)
    }

    /// List hosts in `cluster` via the gateway. Returns the raw channel result.
    pub fn list_hosts(&self, cluster: &str, timeout: Duration) -> Result<ProcessOutput> {
        self.ensure_cluster(cluster)?;
        tracing::info!(cluster = %cluster, "list hosts");
        let out = self
            .channel
            .list_hosts(cluster, timeout)
            .map_err(|e| self.channel_error(e, cluster, cluster))?;
        if out.timed_out {
            return Err(PlatformError::Timeout {
                target: cluster.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        if out.exit_code != Some(0) {
            return Err(PlatformError::Execution {
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }

    fn channel_error(&self, err: ChannelError, cluster: &str, target: &str) -> PlatformError {
        match err {
            ChannelError::AuthRejected(detail) => {
                tracing::warn!(cluster = %cluster, "authentication rejected");
                PlatformError::Authentication {
                    cluster: cluster.to_string(),
                    detail,
                    hint: self.config.login_hint(cluster),
                }
            }
            ChannelError::Unreachable(detail) => PlatformError::Unreachable {
                target: target.to_string(),
                detail,
            },
            ChannelError::Spawn(detail) => PlatformError::InvalidConfig(detail),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalShellChannel;
    use crate::testing::RecordingChannel;

    fn local_executor() -> RemoteExecutor {
        RemoteExecutor::new(Config::default(), Arc::new(LocalShellChannel)).unwrap()
    }

    #[test]
    fn metacharacters_reach_remote_as_one_literal_argument() {
        let exec = local_executor();
        let target = exec.target("staging", "k8s-master-01", None).unwrap();
        let nasty = [
            "plain",
            "two words",
            "semi; touch /tmp/pwned",
            "`id`",
            "$(whoami)",
            "quote ' inside",
            "double \" quote",
            "back\\slash",
            "&& || | > <",
            "$HOME",
            "*",
            "\nnewline",
        ];
        for s in nasty {
            let cmd = RemoteCommand::new("printf").arg("%s").arg(s);
            let result = exec.execute(&target, &cmd, Duration::from_secs(5)).unwrap();
            assert!(result.success, "printf failed for {s:?}: {}", result.stderr);
            assert_eq!(result.stdout, s, "argument was altered in transit");
        }
    }

    #[test]
    fn argument_count_is_preserved() {
        let exec = local_executor();
        let target = exec.target("staging", "host-a", None).unwrap();
        let cmd = RemoteCommand::new("sh")
            .arg("-c")
            .arg("echo $#")
            .arg("argv0")
            .args(["a; b", "c d", "$(e)"]);
        let result = exec.execute(&target, &cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(result.stdout.trim(), "3");
    }

    #[test]
    fn unknown_cluster_never_touches_channel() {
        let channel = Arc::new(RecordingChannel::new());
        let exec = RemoteExecutor::new(Config::default(), channel.clone()).unwrap();
        let target = RemoteTarget {
            cluster_identity: "rogue".into(),
            host: "h".into(),
            user: "platform-ops".into(),
        };
        let err = exec
            .execute(&target, &RemoteCommand::new("true"), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
        assert!(exec.target("rogue", "h", None).is_err());
        assert!(exec.list_hosts("rogue", Duration::from_secs(1)).is_err());
        assert_eq!(channel.calls(), 0);
    }

    #[test]
    fn privileged_and_malformed_targets_rejected() {
        let exec = local_executor();
        assert!(exec.target("staging", "host", Some("root")).is_err());
        assert!(exec.target("staging", "-oProxyCommand=x", None).is_err());
        assert!(exec.target("staging", "host name", None).is_err());
        assert!(exec.target("staging", "host", Some("bad user")).is_err());
        let t = exec.target("staging", "host", None).unwrap();
        assert_eq!(t.user, "platform-ops");
    }

    #[test]
    fn empty_command_rejected() {
        let exec = local_executor();
        let target = exec.target("staging", "host", None).unwrap();
        let err = exec
            .execute(&target, &RemoteCommand::from_argv(vec![]), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn nonzero_exit_is_data_not_error() {
        let exec = local_executor();
        let target = exec.target("staging", "host", None).unwrap();
        let cmd = RemoteCommand::new("sh").arg("-c").arg("echo missing >&2; exit 4");
        let result = exec.execute(&target, &cmd, Duration::from_secs(5)).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(4));
        assert_eq!(result.stderr.trim(), "missing");
        assert!(result.remediation_hint.is_some());
        assert_eq!(result.error_kind(), Some(ErrorKind::Execution));
    }

    #[test]
    fn timeout_kills_and_reports() {
        let exec = local_executor();
        let target = exec.target("staging", "host", None).unwrap();
        let cmd = RemoteCommand::new("sleep").arg("10");
        let result = exec.execute(&target, &cmd, Duration::from_secs(1)).unwrap();
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.message.contains("timed out"));
        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));

        let err = result
            .require_success(&target, Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn success_has_no_hint() {
        let exec = local_executor();
        let target = exec.target("staging", "host", None).unwrap();
        let result = exec
            .execute(&target, &RemoteCommand::new("true"), Duration::from_secs(5))
            .unwrap();
        assert!(result.success);
        assert!(result.remediation_hint.is_none());
        assert_eq!(result.error_kind(), None);
    }

    #[test]
    fn auth_rejection_surfaces_login_hint() {
        let channel = Arc::new(RecordingChannel::new().auth_rejected());
        let exec = RemoteExecutor::new(Config::default(), channel.clone()).unwrap();
        let target = exec.target("production", "web-1", None).unwrap();
        let err = exec
            .execute(&target, &RemoteCommand::new("true"), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        let hint = err.remediation_hint().unwrap();
        assert!(hint.contains("tsh login"));
        assert!(hint.contains("production"));
        assert_eq!(channel.calls(), 1, "auth failures are never retried");
    }

    #[test]
    fn invalid_config_refuses_construction() {
        let cfg = Config {
            clusters: vec![],
            ..Config::default()
        };
        assert!(RemoteExecutor::new(cfg, Arc::new(LocalShellChannel)).is_err());
    }
}
