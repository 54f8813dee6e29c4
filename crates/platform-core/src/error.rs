use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("authentication rejected by cluster '{cluster}': {detail}")]
    Authentication {
        cluster: String,
        detail: String,
        hint: String,
    },

    #[error("cannot reach {target}: {detail}")]
    Unreachable { target: String, detail: String },

    #[error("command timed out after {seconds}s on {target}")]
    Timeout { target: String, seconds: u64 },

    #[error("remote command failed with exit code {exit_code:?}: {stderr}")]
    Execution {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("could not parse output of '{command}': {detail}")]
    Parse { command: String, detail: String },

    #[error("token not found: {0}")]
    TokenNotFound(String),

    #[error("token expired: {0}")]
    TokenExpired(String),

    #[error("token already consumed: {0}")]
    TokenAlreadyConsumed(String),

    #[error("token {token_id} was not issued for this subject")]
    TokenMismatch { token_id: String },

    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task not found: {0}")]
    UnknownTask(String),

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("task set is empty")]
    EmptyTaskSet,

    #[error("task '{task}' has invalid duration {duration}: must be positive")]
    InvalidDuration { task: String, duration: f64 },

    #[error("task '{task}' is not ready: {reason}")]
    TaskNotReady { task: String, reason: String },

    #[error("tool already registered: {0}")]
    ToolAlreadyRegistered(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Discriminator carried in every structured failure result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTarget,
    InvalidArgument,
    Authentication,
    Unreachable,
    Timeout,
    Execution,
    Parse,
    TokenNotFound,
    TokenExpired,
    TokenAlreadyConsumed,
    TokenMismatch,
    CyclicDependency,
    UnknownDependency,
    UnknownTask,
    DuplicateTask,
    EmptyTaskSet,
    InvalidDuration,
    TaskNotReady,
    ToolAlreadyRegistered,
    InvalidConfig,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidTarget => "invalid_target",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Execution => "execution",
            ErrorKind::Parse => "parse",
            ErrorKind::TokenNotFound => "token_not_found",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::TokenAlreadyConsumed => "token_already_consumed",
            ErrorKind::TokenMismatch => "token_mismatch",
            ErrorKind::CyclicDependency => "cyclic_dependency",
            ErrorKind::UnknownDependency => "unknown_dependency",
            ErrorKind::UnknownTask => "unknown_task",
            ErrorKind::DuplicateTask => "duplicate_task",
            ErrorKind::EmptyTaskSet => "empty_task_set",
            ErrorKind::InvalidDuration => "invalid_duration",
            ErrorKind::TaskNotReady => "task_not_ready",
            ErrorKind::ToolAlreadyRegistered => "tool_already_registered",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlatformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            PlatformError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            PlatformError::Authentication { .. } => ErrorKind::Authentication,
            PlatformError::Unreachable { .. } => ErrorKind::Unreachable,
            PlatformError::Timeout { .. } => ErrorKind::Timeout,
            PlatformError::Execution { .. } => ErrorKind::Execution,
            PlatformError::Parse { .. } => ErrorKind::Parse,
            PlatformError::TokenNotFound(_) => ErrorKind::TokenNotFound,
            PlatformError::TokenExpired(_) => ErrorKind::TokenExpired,
            PlatformError::TokenAlreadyConsumed(_) => ErrorKind::TokenAlreadyConsumed,
            PlatformError::TokenMismatch { .. } => ErrorKind::TokenMismatch,
            PlatformError::CyclicDependency(_) => ErrorKind::CyclicDependency,
            PlatformError::UnknownDependency { .. } => ErrorKind::UnknownDependency,
            PlatformError::UnknownTask(_) => ErrorKind::UnknownTask,
            PlatformError::DuplicateTask(_) => ErrorKind::DuplicateTask,
            PlatformError::EmptyTaskSet => ErrorKind::EmptyTaskSet,
            PlatformError::InvalidDuration { .. } => ErrorKind::InvalidDuration,
            PlatformError::TaskNotReady { .. } => ErrorKind::TaskNotReady,
            PlatformError::ToolAlreadyRegistered(_) => ErrorKind::ToolAlreadyRegistered,
            PlatformError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            PlatformError::Io(_) | PlatformError::Yaml(_) | PlatformError::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Advisory text for the operator. Never executed by anything in this crate.
    pub fn remediation_hint(&self) -> Option<String> {
        match self {
            PlatformError::InvalidTarget(_) => {
                Some("Check the cluster name against the configured allow-list".to_string())
            }
            PlatformError::Authentication { hint, .. } => Some(hint.clone()),
            PlatformError::Unreachable { target, .. } => Some(format!(
                "Verify {target} is listed by list_nodes and the gateway is reachable"
            )),
            PlatformError::Timeout { .. } => Some(
                "The command may still be running remotely; retry with a longer timeout"
                    .to_string(),
            ),
            PlatformError::Execution { .. } => {
                Some("Inspect stderr for the remote tool's error message".to_string())
            }
            PlatformError::Parse { .. } => Some(
                "Run the command manually and confirm it produces JSON output".to_string(),
            ),
            PlatformError::TokenNotFound(_) => {
                Some("Request a new token from the matching analysis/proposal step".to_string())
            }
            PlatformError::TokenExpired(_) => {
                Some("The token outlived its TTL; re-run validation to get a fresh one".to_string())
            }
            PlatformError::TokenAlreadyConsumed(_) => {
                Some("Tokens are single-use; re-propose or re-analyze to continue".to_string())
            }
            PlatformError::TokenMismatch { .. } => Some(
                "Submit exactly the payload that was validated, or validate the new one"
                    .to_string(),
            ),
            PlatformError::TaskNotReady { .. } => {
                Some("Choose one of the ready_tasks from the analysis".to_string())
            }
            PlatformError::InvalidConfig(_) => Some(
                "Fix .platform/config.yaml (install tsh or set tsh_binary if it was not found)"
                    .to_string(),
            ),
            _ => None,
        }
    }
}
