//! Infrastructure operations composed from [`RemoteExecutor`] calls.
//!
//! Each operation validates the cluster first, then its own inputs, builds an
//! argv (never a shell string), runs it on the named host and parses the
//! machine-readable output. Output that does not parse is a `Parse` error,
//! distinct from the command failing to run.

use crate::executor::{RemoteCommand, RemoteExecutor, RemoteTarget};
use crate::error::{PlatformError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const KUSTOMIZATION_RESOURCE: &str = "kustomizations.kustomize.toolkit.fluxcd.io";
const GIT_REPOSITORY_RESOURCE: &str = "gitrepositories.source.toolkit.fluxcd.io";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub hostname: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub name: String,
    pub namespace: String,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_revision: Option<String>,
    pub status_detail: String,
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Everything a single Kustomization reports beyond its list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDetails {
    pub name: String,
    pub namespace: String,
    pub ready: bool,
    pub suspended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,
    pub path: String,
    pub interval: String,
    pub prune: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempted_revision: Option<String>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendResult {
    pub name: String,
    pub namespace: String,
    /// Observed state after the call.
    pub suspended: bool,
    /// False when the resource was already in the requested state.
    pub changed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub event_type: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub name: String,
    pub namespace: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub status_detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCheck {
    pub cluster: String,
    pub host: String,
    pub user: String,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

fn resource_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9.]{0,251}[a-z0-9])?$").expect("valid regex")
    })
}

fn namespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").expect("valid regex"))
}

fn validate_resource_name(name: &str) -> Result<()> {
    if resource_name_re().is_match(name) {
        Ok(())
    } else {
        Err(PlatformError::InvalidArgument(format!(
            "invalid resource name '{name}': must be a lowercase DNS-1123 name"
        )))
    }
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace_re().is_match(namespace) {
        Ok(())
    } else {
        Err(PlatformError::InvalidArgument(format!(
            "invalid namespace '{namespace}': must be a lowercase DNS-1123 label"
        )))
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

fn str_at(v: &Value, pointer: &str) -> Option<String> {
    v.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

fn items<'v>(doc: &'v Value, command: &RemoteCommand) -> Result<&'v Vec<Value>> {
    doc.get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| PlatformError::Parse {
            command: command.to_string(),
            detail: "expected an object with an 'items' array".to_string(),
        })
}

/// `(ready, detail)` from the `Ready` entry in `status.conditions`.
fn ready_condition(item: &Value) -> (bool, String) {
    let ready = item
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .and_then(|conds| {
            conds
                .iter()
                .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"))
        });
    match ready {
        Some(c) => (
            c.get("status").and_then(Value::as_str) == Some("True"),
            str_at(c, "/message").unwrap_or_default(),
        ),
        None => (false, "no Ready condition reported".to_string()),
    }
}

// ---------------------------------------------------------------------------
// InfraTools
// ---------------------------------------------------------------------------

pub struct InfraTools {
    executor: Arc<RemoteExecutor>,
}

impl InfraTools {
    pub fn new(executor: Arc<RemoteExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &RemoteExecutor {
        &self.executor
    }

    fn timeout(&self) -> Duration {
        self.executor.default_timeout()
    }

    /// `kubectl`/`flux` invocation, prefixed with `sudo` when configured.
    fn cluster_cli(&self, program: &str) -> RemoteCommand {
        if self.executor.config().use_sudo {
            RemoteCommand::new("sudo").arg(program)
        } else {
            RemoteCommand::new(program)
        }
    }

    fn target(&self, cluster: &str, host: &str) -> Result<RemoteTarget> {
        self.executor.target(cluster, host, None)
    }

    fn run(&self, target: &RemoteTarget, command: &RemoteCommand) -> Result<String> {
        let timeout = self.timeout();
        let result = self
            .executor
            .execute(target, command, timeout)?
            .require_success(target, timeout)?;
        Ok(result.stdout)
    }

    fn run_json(&self, target: &RemoteTarget, command: &RemoteCommand) -> Result<Value> {
        let stdout = self.run(target, command)?;
        serde_json::from_str(&stdout).map_err(|e| PlatformError::Parse {
            command: command.to_string(),
            detail: e.to_string(),
        })
    }

    fn namespace_or_default<'a>(&'a self, namespace: Option<&'a str>) -> &'a str {
        namespace.unwrap_or(&self.executor.config().default_namespace)
    }

    /// Hosts reachable in `cluster`, optionally narrowed to those whose
    /// hostname contains `name_filter` (case-insensitive).
    pub fn list_nodes(&self, cluster: &str, name_filter: Option<&str>) -> Result<Vec<NodeInfo>> {
        self.executor.ensure_cluster(cluster)?;
        let timeout = Duration::from_secs(self.executor.config().list_timeout_seconds);
        let out = self.executor.list_hosts(cluster, timeout)?;
        let doc: Value = serde_json::from_str(&out.stdout).map_err(|e| PlatformError::Parse {
            command: "tsh ls --format=json".to_string(),
            detail: e.to_string(),
        })?;
        let entries = doc.as_array().ok_or_else(|| PlatformError::Parse {
            command: "tsh ls --format=json".to_string(),
            detail: "expected a JSON array of nodes".to_string(),
        })?;

        let filter = name_filter.map(str::to_lowercase);
        let nodes = entries
            .iter()
            .map(|n| {
                let labels = n
                    .pointer("/metadata/labels")
                    .and_then(Value::as_object)
                    .map(|m| {
                        m.iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                NodeInfo {
                    hostname: str_at(n, "/spec/hostname").unwrap_or_default(),
                    name: str_at(n, "/metadata/name").unwrap_or_default(),
                    address: str_at(n, "/spec/addr"),
                    labels,
                }
            })
            .filter(|n| match &filter {
                Some(f) => n.hostname.to_lowercase().contains(f.as_str()),
                None => true,
            })
            .collect();
        Ok(nodes)
    }

    /// Run `echo ok` as the configured user to prove the path works.
    pub fn verify_access(&self, cluster: &str, host: &str) -> Result<AccessCheck> {
        let target = self.target(cluster, host)?;
        let timeout = self.timeout();
        let result = self
            .executor
            .execute(&target, &RemoteCommand::new("echo").arg("ok"), timeout)?
            .require_success(&target, timeout)?;
        if result.stdout.trim() != "ok" {
            return Err(PlatformError::Parse {
                command: "echo ok".to_string(),
                detail: format!("unexpected output {:?}", result.stdout.trim()),
            });
        }
        Ok(AccessCheck {
            cluster: target.cluster_identity,
            host: target.host,
            user: target.user,
            duration_ms: result.duration_ms,
        })
    }

    /// Flux Kustomizations across all namespaces, as seen from `host`.
    pub fn list_managed_resources(&self, cluster: &str, host: &str) -> Result<Vec<ResourceStatus>> {
        let target = self.target(cluster, host)?;
        let cmd = self
            .cluster_cli("kubectl")
            .args(["get", KUSTOMIZATION_RESOURCE, "-A", "-o", "json"]);
        let doc = self.run_json(&target, &cmd)?;
        let resources = items(&doc, &cmd)?
            .iter()
            .map(|item| {
                let (ready, detail) = ready_condition(item);
                ResourceStatus {
                    name: str_at(item, "/metadata/name").unwrap_or_default(),
                    namespace: str_at(item, "/metadata/namespace").unwrap_or_default(),
                    ready,
                    last_applied_revision: str_at(item, "/status/lastAppliedRevision"),
                    status_detail: detail,
                    suspended: item
                        .pointer("/spec/suspend")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }
            })
            .collect();
        Ok(resources)
    }

    fn read_kustomization(&self, target: &RemoteTarget, name: &str, namespace: &str) -> Result<Value> {
        let cmd = self
            .cluster_cli("kubectl")
            .args(["get", KUSTOMIZATION_RESOURCE, name, "-n", namespace, "-o", "json"]);
        self.run_json(target, &cmd)
    }

    fn read_suspended(&self, target: &RemoteTarget, name: &str, namespace: &str) -> Result<bool> {
        let doc = self.read_kustomization(target, name, namespace)?;
        Ok(doc
            .pointer("/spec/suspend")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Source, path, interval and conditions of one Kustomization. Read only.
    pub fn get_resource_details(
        &self,
        cluster: &str,
        host: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<ResourceDetails> {
        self.executor.ensure_cluster(cluster)?;
        let namespace = self.namespace_or_default(namespace);
        validate_resource_name(name)?;
        validate_namespace(namespace)?;
        let target = self.target(cluster, host)?;

        let doc = self.read_kustomization(&target, name, namespace)?;
        let (ready, _) = ready_condition(&doc);
        let source_ref = doc.pointer("/spec/sourceRef").map(|r| SourceRef {
            kind: str_at(r, "/kind").unwrap_or_default(),
            name: str_at(r, "/name").unwrap_or_default(),
            namespace: str_at(r, "/namespace"),
        });
        let conditions = doc
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .map(|conds| {
                conds
                    .iter()
                    .map(|c| Condition {
                        condition_type: str_at(c, "/type").unwrap_or_default(),
                        status: str_at(c, "/status").unwrap_or_else(|| "Unknown".to_string()),
                        reason: str_at(c, "/reason"),
                        message: str_at(c, "/message").unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ResourceDetails {
            name: str_at(&doc, "/metadata/name").unwrap_or_else(|| name.to_string()),
            namespace: str_at(&doc, "/metadata/namespace").unwrap_or_else(|| namespace.to_string()),
            ready,
            suspended: doc
                .pointer("/spec/suspend")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            source_ref,
            path: str_at(&doc, "/spec/path").unwrap_or_default(),
            interval: str_at(&doc, "/spec/interval").unwrap_or_default(),
            prune: doc
                .pointer("/spec/prune")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            last_applied_revision: str_at(&doc, "/status/lastAppliedRevision"),
            last_attempted_revision: str_at(&doc, "/status/lastAttemptedRevision"),
            conditions,
        })
    }

    /// Suspend or resume reconciliation of a Kustomization.
    ///
    /// MUTATES REMOTE STATE. This is the only state-changing infrastructure
    /// operation and it is not token-gated. Idempotent: when the resource is
    /// already in the requested state nothing is run and `changed` is false.
    pub fn set_resource_suspended(
        &self,
        cluster: &str,
        host: &str,
        name: &str,
        namespace: Option<&str>,
        suspended: bool,
    ) -> Result<SuspendResult> {
        self.executor.ensure_cluster(cluster)?;
        let namespace = self.namespace_or_default(namespace);
        validate_resource_name(name)?;
        validate_namespace(namespace)?;
        let target = self.target(cluster, host)?;

        let verb = if suspended { "suspend" } else { "resume" };
        if self.read_suspended(&target, name, namespace)? == suspended {
            return Ok(SuspendResult {
                name: name.to_string(),
                namespace: namespace.to_string(),
                suspended,
                changed: false,
                message: format!("Kustomization {namespace}/{name} is already {verb}d"),
            });
        }

        tracing::info!(cluster = %cluster, host = %host, name = %name, namespace = %namespace, verb, "toggling kustomization");
        let cmd = self
            .cluster_cli("flux")
            .args([verb, "kustomization", name, "-n", namespace]);
        self.run(&target, &cmd)?;

        let observed = self.read_suspended(&target, name, namespace)?;
        if observed != suspended {
            return Err(PlatformError::Execution {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: format!(
                    "flux {verb} exited 0 but {namespace}/{name} reports suspend={observed}"
                ),
            });
        }
        Ok(SuspendResult {
            name: name.to_string(),
            namespace: namespace.to_string(),
            suspended: observed,
            changed: true,
            message: format!("Kustomization {namespace}/{name} {verb}d"),
        })
    }

    /// Events involving `name`, oldest first.
    pub fn get_resource_events(
        &self,
        cluster: &str,
        host: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Event>> {
        self.executor.ensure_cluster(cluster)?;
        let namespace = self.namespace_or_default(namespace);
        validate_resource_name(name)?;
        validate_namespace(namespace)?;
        let target = self.target(cluster, host)?;

        let cmd = self.cluster_cli("kubectl").args([
            "get".to_string(),
            "events".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            format!("--field-selector=involvedObject.name={name}"),
            "--sort-by=.lastTimestamp".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ]);
        let doc = self.run_json(&target, &cmd)?;
        let mut events: Vec<Event> = items(&doc, &cmd)?
            .iter()
            .map(|e| Event {
                timestamp: str_at(e, "/lastTimestamp")
                    .or_else(|| str_at(e, "/eventTime"))
                    .or_else(|| str_at(e, "/firstTimestamp")),
                event_type: str_at(e, "/type").unwrap_or_else(|| "Normal".to_string()),
                reason: str_at(e, "/reason").unwrap_or_default(),
                message: str_at(e, "/message").unwrap_or_default(),
                count: e.get("count").and_then(Value::as_i64),
                source: str_at(e, "/source/component").or_else(|| str_at(e, "/reportingComponent")),
            })
            .collect();
        // RFC 3339 timestamps order lexically; stable for equal or missing ones.
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }

    /// Last `tail_lines` log lines of a GitOps controller deployment.
    pub fn get_logs(
        &self,
        cluster: &str,
        host: &str,
        component: &str,
        tail_lines: u32,
    ) -> Result<String> {
        self.executor.ensure_cluster(cluster)?;
        let config = self.executor.config();
        if !config.log_components.iter().any(|c| c == component) {
            return Err(PlatformError::InvalidArgument(format!(
                "unknown component '{component}' (allowed: {})",
                config.log_components.join(", ")
            )));
        }
        if tail_lines == 0 || tail_lines > config.max_log_lines {
            return Err(PlatformError::InvalidArgument(format!(
                "tail_lines must be between 1 and {} (got {tail_lines})",
                config.max_log_lines
            )));
        }
        let target = self.target(cluster, host)?;
        let cmd = self.cluster_cli("kubectl").args([
            "logs".to_string(),
            "-n".to_string(),
            config.default_namespace.clone(),
            format!("deploy/{component}"),
            format!("--tail={tail_lines}"),
        ]);
        self.run(&target, &cmd)
    }

    /// Flux GitRepository sources across all namespaces.
    pub fn list_git_sources(&self, cluster: &str, host: &str) -> Result<Vec<GitSource>> {
        let target = self.target(cluster, host)?;
        let cmd = self
            .cluster_cli("kubectl")
            .args(["get", GIT_REPOSITORY_RESOURCE, "-A", "-o", "json"]);
        let doc = self.run_json(&target, &cmd)?;
        let sources = items(&doc, &cmd)?
            .iter()
            .map(|item| {
                let (ready, detail) = ready_condition(item);
                GitSource {
                    name: str_at(item, "/metadata/name").unwrap_or_default(),
                    namespace: str_at(item, "/metadata/namespace").unwrap_or_default(),
                    url: str_at(item, "/spec/url").unwrap_or_default(),
                    branch: str_at(item, "/spec/ref/branch"),
                    ready,
                    revision: str_at(item, "/status/artifact/revision"),
                    status_detail: detail,
                }
            })
            .collect();
        Ok(sources)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::testing::{failed, ok, RecordingChannel};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn tools_with(channel: Arc<RecordingChannel>) -> InfraTools {
        let exec = RemoteExecutor::new(Config::default(), channel).unwrap();
        InfraTools::new(Arc::new(exec))
    }

    fn has(argv: &[String], word: &str) -> bool {
        argv.iter().any(|a| a == word)
    }

    #[test]
    fn rogue_cluster_never_reaches_channel() {
        let channel = Arc::new(RecordingChannel::new());
        let tools = tools_with(channel.clone());
        let rogue = "not-a-cluster";
        let results: Vec<ErrorKind> = vec![
            tools.list_nodes(rogue, None).unwrap_err().kind(),
            tools.verify_access(rogue, "h").unwrap_err().kind(),
            tools.list_managed_resources(rogue, "h").unwrap_err().kind(),
            tools
                .set_resource_suspended(rogue, "h", "apps", None, true)
                .unwrap_err()
                .kind(),
            tools.get_resource_events(rogue, "h", "apps", None).unwrap_err().kind(),
            tools.get_resource_details(rogue, "h", "apps", None).unwrap_err().kind(),
            tools
                .get_logs(rogue, "h", "source-controller", 10)
                .unwrap_err()
                .kind(),
            tools.list_git_sources(rogue, "h").unwrap_err().kind(),
        ];
        assert!(results.iter().all(|k| *k == ErrorKind::InvalidTarget), "{results:?}");
        assert_eq!(channel.calls(), 0);
    }

    #[test]
    fn list_nodes_filters_by_hostname() {
        let hosts = json!([
            {"kind": "node", "metadata": {"name": "a1", "labels": {"env": "staging"}},
             "spec": {"hostname": "k8s-master-01", "addr": "10.0.0.1:3022"}},
            {"kind": "node", "metadata": {"name": "b2"},
             "spec": {"hostname": "db-01"}}
        ]);
        let channel = Arc::new(RecordingChannel::new().with_hosts(hosts.to_string()));
        let tools = tools_with(channel);

        let all = tools.list_nodes("staging", None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].labels["env"], "staging");
        assert_eq!(all[0].address.as_deref(), Some("10.0.0.1:3022"));

        let masters = tools.list_nodes("staging", Some("MASTER")).unwrap();
        assert_eq!(masters.len(), 1);
        assert_eq!(masters[0].hostname, "k8s-master-01");

        assert!(tools.list_nodes("staging", Some("nothing")).unwrap().is_empty());
    }

    #[test]
    fn managed_resources_parse_ready_condition() {
        let doc = json!({"items": [
            {"metadata": {"name": "apps", "namespace": "flux-system"},
             "spec": {"suspend": false},
             "status": {"lastAppliedRevision": "main@sha1:abc",
                        "conditions": [{"type": "Ready", "status": "True", "message": "Applied revision: main@sha1:abc"}]}},
            {"metadata": {"name": "infra", "namespace": "flux-system"},
             "spec": {"suspend": true},
             "status": {"conditions": [{"type": "Ready", "status": "False", "message": "kustomize build failed"}]}}
        ]});
        let channel = Arc::new(RecordingChannel::new().respond(move |_| ok(doc.to_string())));
        let tools = tools_with(channel.clone());
        let resources = tools.list_managed_resources("staging", "k8s-master-01").unwrap();
        assert_eq!(resources.len(), 2);
        assert!(resources[0].ready);
        assert_eq!(resources[0].last_applied_revision.as_deref(), Some("main@sha1:abc"));
        assert!(!resources[1].ready);
        assert!(resources[1].suspended);
        assert_eq!(resources[1].status_detail, "kustomize build failed");

        let argv = &channel.commands()[0];
        assert_eq!(argv[0], "sudo");
        assert_eq!(argv[1], "kubectl");
    }

    #[test]
    fn unparseable_output_is_parse_error() {
        let channel = Arc::new(RecordingChannel::new().respond(|_| ok("No resources found")));
        let tools = tools_with(channel);
        let err = tools.list_managed_resources("staging", "h").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn nonzero_exit_is_execution_error() {
        let channel = Arc::new(
            RecordingChannel::new().respond(|_| failed(1, "error: the server doesn't have a resource type")),
        );
        let tools = tools_with(channel);
        let err = tools.list_git_sources("staging", "h").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    fn suspend_simulator(state: Arc<AtomicBool>) -> RecordingChannel {
        RecordingChannel::new().respond(move |argv| {
            if has(argv, "flux") && has(argv, "suspend") {
                state.store(true, Ordering::SeqCst);
                ok("► suspending kustomization")
            } else if has(argv, "flux") && has(argv, "resume") {
                state.store(false, Ordering::SeqCst);
                ok("► resuming kustomization")
            } else {
                let doc = json!({"metadata": {"name": "apps"}, "spec": {"suspend": state.load(Ordering::SeqCst)}});
                ok(doc.to_string())
            }
        })
    }

    #[test]
    fn suspend_twice_is_idempotent() {
        let state = Arc::new(AtomicBool::new(false));
        let channel = Arc::new(suspend_simulator(state.clone()));
        let tools = tools_with(channel.clone());

        let first = tools
            .set_resource_suspended("staging", "h", "apps", None, true)
            .unwrap();
        assert!(first.changed);
        assert!(first.suspended);
        assert!(state.load(Ordering::SeqCst));

        let second = tools
            .set_resource_suspended("staging", "h", "apps", None, true)
            .unwrap();
        assert!(!second.changed);
        assert!(second.suspended);
        assert!(state.load(Ordering::SeqCst));

        let flux_calls = channel
            .commands()
            .iter()
            .filter(|argv| has(argv, "flux"))
            .count();
        assert_eq!(flux_calls, 1);
    }

    #[test]
    fn resume_uses_default_namespace() {
        let state = Arc::new(AtomicBool::new(true));
        let channel = Arc::new(suspend_simulator(state.clone()));
        let tools = tools_with(channel.clone());
        let result = tools
            .set_resource_suspended("staging", "h", "apps", None, false)
            .unwrap();
        assert_eq!(result.namespace, "flux-system");
        assert!(!result.suspended);
        let flux = channel
            .commands()
            .into_iter()
            .find(|argv| has(argv, "flux"))
            .unwrap();
        assert_eq!(
            flux,
            vec!["sudo", "flux", "resume", "kustomization", "apps", "-n", "flux-system"]
        );
    }

    #[test]
    fn injected_names_rejected_before_execution() {
        let channel = Arc::new(RecordingChannel::new());
        let tools = tools_with(channel.clone());
        for name in ["apps; rm -rf /", "$(id)", "Apps", "-n", ""] {
            let err = tools
                .set_resource_suspended("staging", "h", name, None, true)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{name:?}");
        }
        let err = tools
            .get_resource_events("staging", "h", "apps", Some("kube system"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(channel.calls(), 0);
    }

    #[test]
    fn events_are_ordered_oldest_first() {
        let doc = json!({"items": [
            {"type": "Warning", "reason": "BuildFailed", "message": "late", "count": 3,
             "lastTimestamp": "2026-02-01T10:05:00Z", "source": {"component": "kustomize-controller"}},
            {"type": "Normal", "reason": "Progressing", "message": "early",
             "lastTimestamp": "2026-02-01T10:00:00Z"}
        ]});
        let channel = Arc::new(RecordingChannel::new().respond(move |_| ok(doc.to_string())));
        let tools = tools_with(channel.clone());
        let events = tools.get_resource_events("staging", "h", "apps", None).unwrap();
        assert_eq!(events[0].message, "early");
        assert_eq!(events[1].reason, "BuildFailed");
        assert_eq!(events[1].count, Some(3));
        assert_eq!(events[1].source.as_deref(), Some("kustomize-controller"));
        assert!(has(
            &channel.commands()[0],
            "--field-selector=involvedObject.name=apps"
        ));
    }

    #[test]
    fn logs_validate_component_and_bounds() {
        let channel = Arc::new(RecordingChannel::new().respond(|_| ok("line1\nline2\n")));
        let tools = tools_with(channel.clone());
        assert_eq!(
            tools.get_logs("staging", "h", "sshd", 10).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            tools
                .get_logs("staging", "h", "source-controller", 0)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            tools
                .get_logs("staging", "h", "source-controller", 5001)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(channel.calls(), 0);

        let text = tools.get_logs("staging", "h", "source-controller", 50).unwrap();
        assert_eq!(text, "line1\nline2\n");
        let argv = &channel.commands()[0];
        assert!(has(argv, "deploy/source-controller"));
        assert!(has(argv, "--tail=50"));
    }

    #[test]
    fn git_sources_parse() {
        let doc = json!({"items": [
            {"metadata": {"name": "platform", "namespace": "flux-system"},
             "spec": {"url": "ssh://git@example.net/platform.git", "ref": {"branch": "main"}},
             "status": {"artifact": {"revision": "main@sha1:def"},
                        "conditions": [{"type": "Ready", "status": "True", "message": "stored artifact"}]}}
        ]});
        let channel = Arc::new(RecordingChannel::new().respond(move |_| ok(doc.to_string())));
        let tools = tools_with(channel);
        let sources = tools.list_git_sources("staging", "h").unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].branch.as_deref(), Some("main"));
        assert!(sources[0].ready);
        assert_eq!(sources[0].revision.as_deref(), Some("main@sha1:def"));
    }

    #[test]
    fn resource_details_parse_spec_and_status() {
        let doc = json!({
            "metadata": {"name": "apps", "namespace": "flux-system"},
            "spec": {
                "suspend": true, "path": "./clusters/staging/apps", "interval": "10m", "prune": true,
                "sourceRef": {"kind": "GitRepository", "name": "flux-system"}
            },
            "status": {
                "lastAppliedRevision": "main@sha1:abc",
                "lastAttemptedRevision": "main@sha1:def",
                "conditions": [{"type": "Ready", "status": "False", "reason": "BuildFailed", "message": "kustomize build failed"}]
            }
        });
        let channel = Arc::new(RecordingChannel::new().respond(move |_| ok(doc.to_string())));
        let tools = tools_with(channel.clone());
        let details = tools
            .get_resource_details("staging", "h", "apps", None)
            .unwrap();
        assert!(details.suspended);
        assert!(!details.ready);
        assert!(details.prune);
        assert_eq!(details.path, "./clusters/staging/apps");
        assert_eq!(details.interval, "10m");
        let source = details.source_ref.unwrap();
        assert_eq!(source.kind, "GitRepository");
        assert_eq!(source.namespace, None);
        assert_eq!(details.last_attempted_revision.as_deref(), Some("main@sha1:def"));
        assert_eq!(details.conditions[0].reason.as_deref(), Some("BuildFailed"));

        let argv = &channel.commands()[0];
        assert_eq!(
            argv,
            &vec!["sudo", "kubectl", "get", KUSTOMIZATION_RESOURCE, "apps", "-n", "flux-system", "-o", "json"]
        );
        assert_eq!(channel.calls(), 1, "read only");
    }

    #[test]
    fn resource_details_reject_injected_names() {
        let channel = Arc::new(RecordingChannel::new());
        let tools = tools_with(channel.clone());
        let err = tools
            .get_resource_details("staging", "h", "apps;reboot", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(channel.calls(), 0);
    }

    #[test]
    fn verify_access_runs_echo() {
        let channel = Arc::new(RecordingChannel::new().respond(|_| ok("ok\n")));
        let tools = tools_with(channel.clone());
        let check = tools.verify_access("production", "web-1").unwrap();
        assert_eq!(check.user, "platform-ops");
        assert_eq!(channel.commands()[0], vec!["echo", "ok"]);
    }
}
