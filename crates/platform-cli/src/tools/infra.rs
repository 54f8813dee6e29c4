use super::{optional_str, optional_u64, required_bool, required_str, respond, PlatformTool, Services};
use platform_core::{PlatformError, Result};
use serde_json::{json, Value};

const DEFAULT_TAIL_LINES: u32 = 100;

fn cluster_host_schema(extra: Value, extra_required: &[&str]) -> Value {
    let mut properties = json!({
        "cluster": {"type": "string", "description": "Cluster identity from the allow-list"},
        "host": {"type": "string", "description": "Control-plane host as shown by list_nodes"}
    });
    if let (Some(props), Value::Object(more)) = (properties.as_object_mut(), extra) {
        props.extend(more);
    }
    let mut required = vec!["cluster", "host"];
    required.extend_from_slice(extra_required);
    json!({"type": "object", "properties": properties, "required": required})
}

// ---------------------------------------------------------------------------
// list_nodes
// ---------------------------------------------------------------------------

pub struct ListNodesTool;

impl PlatformTool for ListNodesTool {
    fn name(&self) -> &str {
        "list_nodes"
    }

    fn description(&self) -> &str {
        "List hosts reachable in a cluster, optionally filtered by hostname substring"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cluster": {"type": "string", "description": "Cluster identity from the allow-list"},
                "name_filter": {"type": "string", "description": "Case-insensitive hostname substring"}
            },
            "required": ["cluster"]
        })
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let nodes = services
            .infra
            .list_nodes(cluster, optional_str(&args, "name_filter"))?;
        respond(
            true,
            format!("Found {} node(s) in {cluster}", nodes.len()),
            &json!({ "cluster": cluster, "nodes": nodes }),
        )
    }
}

// ---------------------------------------------------------------------------
// verify_access
// ---------------------------------------------------------------------------

pub struct VerifyAccessTool;

impl PlatformTool for VerifyAccessTool {
    fn name(&self) -> &str {
        "verify_access"
    }

    fn description(&self) -> &str {
        "Check that a host can be reached and a command run as the configured user"
    }

    fn schema(&self) -> Value {
        cluster_host_schema(json!({}), &[])
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let check = services.infra.verify_access(cluster, host)?;
        respond(
            true,
            format!("Access verified: {}@{} ({cluster})", check.user, check.host),
            &check,
        )
    }
}

// ---------------------------------------------------------------------------
// list_managed_resources
// ---------------------------------------------------------------------------

pub struct ListManagedResourcesTool;

impl PlatformTool for ListManagedResourcesTool {
    fn name(&self) -> &str {
        "list_managed_resources"
    }

    fn description(&self) -> &str {
        "List GitOps Kustomizations with readiness, revision and suspension state"
    }

    fn schema(&self) -> Value {
        cluster_host_schema(json!({}), &[])
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let resources = services.infra.list_managed_resources(cluster, host)?;
        let not_ready = resources.iter().filter(|r| !r.ready).count();
        respond(
            true,
            format!("{} resource(s), {not_ready} not ready", resources.len()),
            &json!({ "resources": resources }),
        )
    }
}

// ---------------------------------------------------------------------------
// set_resource_suspended
// ---------------------------------------------------------------------------

pub struct SetResourceSuspendedTool;

impl PlatformTool for SetResourceSuspendedTool {
    fn name(&self) -> &str {
        "set_resource_suspended"
    }

    fn description(&self) -> &str {
        "Suspend or resume reconciliation of a Kustomization. MUTATES cluster state. No-op if already in the requested state."
    }

    fn schema(&self) -> Value {
        cluster_host_schema(
            json!({
                "name": {"type": "string", "description": "Kustomization name"},
                "namespace": {"type": "string", "description": "Namespace (default: configured GitOps namespace)"},
                "suspended": {"type": "boolean", "description": "true to suspend, false to resume"}
            }),
            &["name", "suspended"],
        )
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let name = required_str(&args, "name")?;
        let suspended = required_bool(&args, "suspended")?;
        let result = services.infra.set_resource_suspended(
            cluster,
            host,
            name,
            optional_str(&args, "namespace"),
            suspended,
        )?;
        respond(true, result.message.clone(), &result)
    }
}

// ---------------------------------------------------------------------------
// get_resource_events
// ---------------------------------------------------------------------------

pub struct GetResourceEventsTool;

impl PlatformTool for GetResourceEventsTool {
    fn name(&self) -> &str {
        "get_resource_events"
    }

    fn description(&self) -> &str {
        "Recent events for a named resource, oldest first"
    }

    fn schema(&self) -> Value {
        cluster_host_schema(
            json!({
                "name": {"type": "string", "description": "Resource name"},
                "namespace": {"type": "string", "description": "Namespace (default: configured GitOps namespace)"}
            }),
            &["name"],
        )
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let name = required_str(&args, "name")?;
        let events = services.infra.get_resource_events(
            cluster,
            host,
            name,
            optional_str(&args, "namespace"),
        )?;
        respond(
            true,
            format!("{} event(s) for {name}", events.len()),
            &json!({ "events": events }),
        )
    }
}

// ---------------------------------------------------------------------------
// get_resource_details
// ---------------------------------------------------------------------------

pub struct GetResourceDetailsTool;

impl PlatformTool for GetResourceDetailsTool {
    fn name(&self) -> &str {
        "get_resource_details"
    }

    fn description(&self) -> &str {
        "Source, path, interval, revisions and conditions of one GitOps-managed resource. Read only."
    }

    fn schema(&self) -> Value {
        cluster_host_schema(
            json!({
                "name": {"type": "string", "description": "Resource name"},
                "namespace": {"type": "string", "description": "Namespace (default: configured GitOps namespace)"}
            }),
            &["name"],
        )
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let name = required_str(&args, "name")?;
        let details = services.infra.get_resource_details(
            cluster,
            host,
            name,
            optional_str(&args, "namespace"),
        )?;
        let state = match (details.suspended, details.ready) {
            (true, _) => "suspended",
            (false, true) => "ready",
            (false, false) => "not ready",
        };
        respond(
            true,
            format!("{}/{} is {state}", details.namespace, details.name),
            &json!({ "cluster": cluster, "host": host, "details": details }),
        )
    }
}

// ---------------------------------------------------------------------------
// get_logs
// ---------------------------------------------------------------------------

pub struct GetLogsTool;

impl PlatformTool for GetLogsTool {
    fn name(&self) -> &str {
        "get_logs"
    }

    fn description(&self) -> &str {
        "Tail the logs of a GitOps controller component"
    }

    fn schema(&self) -> Value {
        cluster_host_schema(
            json!({
                "component": {"type": "string", "description": "Controller name, e.g. kustomize-controller"},
                "tail_lines": {"type": "integer", "description": "Number of lines (default 100)"}
            }),
            &["component"],
        )
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let component = required_str(&args, "component")?;
        let tail_lines = match optional_u64(&args, "tail_lines")? {
            None => DEFAULT_TAIL_LINES,
            Some(n) => u32::try_from(n).map_err(|_| {
                PlatformError::InvalidArgument(format!("tail_lines out of range: {n}"))
            })?,
        };
        let logs = services
            .infra
            .get_logs(cluster, host, component, tail_lines)?;
        respond(
            true,
            format!("{} line(s) from {component}", logs.lines().count()),
            &json!({ "component": component, "logs": logs }),
        )
    }
}

// ---------------------------------------------------------------------------
// list_git_sources
// ---------------------------------------------------------------------------

pub struct ListGitSourcesTool;

impl PlatformTool for ListGitSourcesTool {
    fn name(&self) -> &str {
        "list_git_sources"
    }

    fn description(&self) -> &str {
        "List GitOps Git repository sources with their fetched revision"
    }

    fn schema(&self) -> Value {
        cluster_host_schema(json!({}), &[])
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let cluster = required_str(&args, "cluster")?;
        let host = required_str(&args, "host")?;
        let sources = services.infra.list_git_sources(cluster, host)?;
        respond(
            true,
            format!("{} git source(s)", sources.len()),
            &json!({ "sources": sources }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::services;
    use platform_core::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn schema_includes_extra_required_fields() {
        let schema = SetResourceSuspendedTool.schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["cluster", "host", "name", "suspended"]);
        assert!(schema["properties"]["namespace"].is_object());
    }

    #[test]
    fn suspend_requires_boolean() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let err = SetResourceSuspendedTool
            .call(
                json!({"cluster": "staging", "host": "h", "name": "apps", "suspended": "yes"}),
                &s,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn rogue_cluster_rejected_for_every_infra_tool() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let args = json!({
            "cluster": "rogue", "host": "h", "name": "apps",
            "suspended": true, "component": "source-controller"
        });
        let tools: Vec<Box<dyn PlatformTool>> = vec![
            Box::new(ListNodesTool),
            Box::new(VerifyAccessTool),
            Box::new(ListManagedResourcesTool),
            Box::new(SetResourceSuspendedTool),
            Box::new(GetResourceEventsTool),
            Box::new(GetResourceDetailsTool),
            Box::new(GetLogsTool),
            Box::new(ListGitSourcesTool),
        ];
        for tool in tools {
            let err = tool.call(args.clone(), &s).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTarget, "{}", tool.name());
        }
    }

    #[test]
    fn malformed_tail_lines_is_rejected() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        for tail in [json!(-5), json!(2.5), json!("60")] {
            let err = GetLogsTool
                .call(
                    json!({"cluster": "staging", "host": "h", "component": "source-controller", "tail_lines": tail}),
                    &s,
                )
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{tail}");
        }
    }

    #[test]
    fn verify_access_over_loopback() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let v = VerifyAccessTool
            .call(json!({"cluster": "staging", "host": "localhost"}), &s)
            .unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["user"], "platform-ops");
    }
}
