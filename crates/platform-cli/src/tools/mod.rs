use platform_core::channel::RemoteChannel;
use platform_core::config::Config;
use platform_core::critical_path::CriticalPathAnalyzer;
use platform_core::decision::DecisionGate;
use platform_core::executor::RemoteExecutor;
use platform_core::infra::InfraTools;
use platform_core::registry::{FileToolRegistry, ToolRegistrationGate, ToolRegistry};
use platform_core::token::{InMemoryTokenStore, TokenStore};
use platform_core::validator::DesignProposalValidator;
use platform_core::{PlatformError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

pub mod design;
pub mod infra;
pub mod planning;
pub mod remote;

pub trait PlatformTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    fn call(&self, args: Value, services: &Services) -> Result<Value>;
}

pub fn all_tools() -> Vec<Box<dyn PlatformTool>> {
    vec![
        Box::new(remote::RunRemoteCommandTool),
        Box::new(infra::ListNodesTool),
        Box::new(infra::VerifyAccessTool),
        Box::new(infra::ListManagedResourcesTool),
        Box::new(infra::SetResourceSuspendedTool),
        Box::new(infra::GetResourceEventsTool),
        Box::new(infra::GetResourceDetailsTool),
        Box::new(infra::GetLogsTool),
        Box::new(infra::ListGitSourcesTool),
        Box::new(design::ProposeToolDesignTool),
        Box::new(design::VerifyDesignTokenTool),
        Box::new(design::RegisterToolTool),
        Box::new(design::ListRegisteredToolsTool),
        Box::new(design::ListToolProposalsTool),
        Box::new(planning::AnalyzeCriticalPathTool),
        Box::new(planning::VerifyAnalysisTokenTool),
        Box::new(planning::RecordDecisionTool),
        Box::new(planning::ListDecisionsTool),
    ]
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Everything a tool call can reach. Both gates and both token-issuing
/// components share one token store, which lives as long as the server.
pub struct Services {
    pub executor: Arc<RemoteExecutor>,
    pub infra: InfraTools,
    pub validator: DesignProposalValidator,
    pub registration: ToolRegistrationGate,
    pub analyzer: CriticalPathAnalyzer,
    pub decisions: DecisionGate,
}

impl Services {
    /// Load config under `root` and connect through Teleport.
    pub fn load(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        let executor = RemoteExecutor::teleport(config)?;
        Ok(Self::from_executor(root, executor))
    }

    pub fn new(root: &Path, config: Config, channel: Arc<dyn RemoteChannel>) -> Result<Self> {
        let executor = RemoteExecutor::new(config, channel)?;
        Ok(Self::from_executor(root, executor))
    }

    fn from_executor(root: &Path, executor: RemoteExecutor) -> Self {
        let config = executor.config().clone();
        let executor = Arc::new(executor);
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new(config.token_ttl()));
        let registry: Arc<dyn ToolRegistry> = Arc::new(FileToolRegistry::new(root));
        Self {
            infra: InfraTools::new(executor.clone()),
            executor,
            validator: DesignProposalValidator::new(config, store.clone())
                .with_registry(registry.clone()),
            registration: ToolRegistrationGate::new(store.clone(), registry),
            analyzer: CriticalPathAnalyzer::new(store.clone()),
            decisions: DecisionGate::new(store),
        }
    }
}

// ---------------------------------------------------------------------------
// Result shaping
// ---------------------------------------------------------------------------

/// `{success, message, ...fields of data}`. Non-object data lands under `data`.
pub fn respond<T: Serialize>(success: bool, message: impl Into<String>, data: &T) -> Result<Value> {
    let mut out = Map::new();
    out.insert("success".to_string(), Value::Bool(success));
    out.insert("message".to_string(), Value::String(message.into()));
    match serde_json::to_value(data)? {
        Value::Object(fields) => {
            for (k, v) in fields {
                out.entry(k).or_insert(v);
            }
        }
        Value::Null => {}
        other => {
            out.insert("data".to_string(), other);
        }
    }
    Ok(Value::Object(out))
}

/// Structured failure record for a tool error.
pub fn failure(err: &PlatformError) -> Value {
    let mut out = Map::new();
    out.insert("success".to_string(), Value::Bool(false));
    out.insert("message".to_string(), Value::String(err.to_string()));
    out.insert(
        "error_kind".to_string(),
        Value::String(err.kind().as_str().to_string()),
    );
    if let Some(hint) = err.remediation_hint() {
        out.insert("remediation_hint".to_string(), Value::String(hint));
    }
    Value::Object(out)
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args[key]
        .as_str()
        .ok_or_else(|| PlatformError::InvalidArgument(format!("missing required argument: {key}")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args[key].as_str()
}

pub(crate) fn required_arg<T: DeserializeOwned>(args: &Value, key: &str) -> Result<T> {
    match args.get(key) {
        None | Some(Value::Null) => Err(PlatformError::InvalidArgument(format!(
            "missing required argument: {key}"
        ))),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| PlatformError::InvalidArgument(format!("invalid argument '{key}': {e}"))),
    }
}

/// `None` when absent or null. Anything other than a non-negative integer is
/// an error rather than falling back to a default.
pub(crate) fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            PlatformError::InvalidArgument(format!(
                "'{key}' must be a non-negative integer (got {v})"
            ))
        }),
    }
}

pub(crate) fn required_bool(args: &Value, key: &str) -> Result<bool> {
    args[key]
        .as_bool()
        .ok_or_else(|| PlatformError::InvalidArgument(format!("missing required argument: {key}")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_names_are_unique() {
        let tools = all_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), tools.len());
        assert_eq!(tools.len(), 18);
    }

    #[test]
    fn schemas_are_objects() {
        for tool in all_tools() {
            let schema = tool.schema();
            assert_eq!(schema["type"], "object", "{}", tool.name());
            assert!(!tool.description().is_empty());
        }
    }

    #[test]
    fn respond_merges_object_fields() {
        let v = respond(true, "ok", &json!({"count": 2, "message": "shadowed"})).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["message"], "ok");
        assert_eq!(v["count"], 2);

        let v = respond(true, "ok", &vec![1, 2]).unwrap();
        assert_eq!(v["data"], json!([1, 2]));
    }

    #[test]
    fn failure_carries_kind_and_hint() {
        let v = failure(&PlatformError::TokenAlreadyConsumed("valid-x".into()));
        assert_eq!(v["success"], false);
        assert_eq!(v["error_kind"], "token_already_consumed");
        assert!(v["remediation_hint"].as_str().unwrap().contains("single-use"));

        let v = failure(&PlatformError::EmptyTaskSet);
        assert!(v.get("remediation_hint").is_none());
    }

    #[test]
    fn missing_arguments_are_invalid_argument() {
        let args = json!({"cluster": "staging", "count": "three"});
        assert_eq!(required_str(&args, "cluster").unwrap(), "staging");
        assert!(required_str(&args, "host").is_err());
        let err = required_arg::<u32>(&args, "count").unwrap_err();
        assert_eq!(err.kind(), platform_core::ErrorKind::InvalidArgument);
    }

    #[test]
    fn optional_integers_are_strict() {
        let args = json!({"ok": 60, "null": null, "neg": -5, "frac": 2.5, "text": "60"});
        assert_eq!(optional_u64(&args, "ok").unwrap(), Some(60));
        assert_eq!(optional_u64(&args, "null").unwrap(), None);
        assert_eq!(optional_u64(&args, "absent").unwrap(), None);
        for key in ["neg", "frac", "text"] {
            let err = optional_u64(&args, key).unwrap_err();
            assert_eq!(err.kind(), platform_core::ErrorKind::InvalidArgument, "{key}");
        }
    }
}
