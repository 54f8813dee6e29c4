use super::{optional_str, optional_u64, required_arg, required_str, respond, PlatformTool, Services};
use platform_core::executor::RemoteCommand;
use platform_core::{PlatformError, Result};
use serde_json::Value;
use std::time::Duration;

const MAX_TIMEOUT_SECONDS: u64 = 3600;

pub struct RunRemoteCommandTool;

impl PlatformTool for RunRemoteCommandTool {
    fn name(&self) -> &str {
        "run_remote_command"
    }

    fn description(&self) -> &str {
        "Run a command on a host in an allow-listed cluster. Arguments are passed as an argv array and reach the remote process unchanged. Can change remote state."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cluster": {
                    "type": "string",
                    "description": "Cluster identity from the allow-list"
                },
                "host": {
                    "type": "string",
                    "description": "Host name as shown by list_nodes"
                },
                "argv": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Program followed by its arguments"
                },
                "user": {
                    "type": "string",
                    "description": "Login user (default: configured non-privileged user)"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "Hard timeout (default: configured)"
                }
            },
            "required": ["cluster", "host", "argv"]
        })
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let argv: Vec<String> = required_arg(&args, "argv")?;
        let user = optional_str(&args, "user");
        let timeout = match optional_u64(&args, "timeout_seconds")? {
            Some(s) if (1..=MAX_TIMEOUT_SECONDS).contains(&s) => Duration::from_secs(s),
            Some(s) => {
                return Err(PlatformError::InvalidArgument(format!(
                    "timeout_seconds must be between 1 and {MAX_TIMEOUT_SECONDS} (got {s})"
                )))
            }
            None => services.executor.default_timeout(),
        };

        let target = services.executor.target(cluster, host, user)?;
        let result = services
            .executor
            .execute(&target, &RemoteCommand::from_argv(argv), timeout)?;

        let mut value = respond(result.success, result.message.clone(), &result)?;
        if let Some(kind) = result.error_kind() {
            value["error_kind"] = Value::String(kind.as_str().to_string());
        }
        Ok(value)
    }
}
