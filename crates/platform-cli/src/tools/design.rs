use super::{required_arg, required_str, respond, PlatformTool, Services};
use platform_core::proposal::ToolProposal;
use platform_core::{PlatformError, Result};
use serde_json::{json, Value};

fn proposal_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tool_name": {"type": "string", "description": "snake_case tool name"},
            "purpose": {"type": "string", "description": "One sentence: what the tool is for"},
            "layer": {"type": "string", "enum": ["platform", "team", "personal"]},
            "dependencies": {"type": "array", "items": {"type": "string"}, "description": "Capabilities the tool builds on"},
            "mutates_system_state": {"type": "boolean"},
            "implementation_sketch": {"type": "string", "description": "How the tool will work"}
        },
        "required": ["tool_name", "purpose", "layer"]
    })
}

fn parse_proposal(value: Value) -> Result<ToolProposal> {
    serde_json::from_value(value)
        .map_err(|e| PlatformError::InvalidArgument(format!("invalid proposal: {e}")))
}

// ---------------------------------------------------------------------------
// propose_tool_design
// ---------------------------------------------------------------------------

pub struct ProposeToolDesignTool;

impl PlatformTool for ProposeToolDesignTool {
    fn name(&self) -> &str {
        "propose_tool_design"
    }

    fn description(&self) -> &str {
        "Validate a new tool design against the design rules. A valid design receives a single-use token required by register_tool."
    }

    fn schema(&self) -> Value {
        proposal_schema()
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let proposal = parse_proposal(args)?;
        let result = services.validator.propose(&proposal)?;
        let message = match &result.token {
            Some(token) => format!(
                "Design for '{}' is valid; use token {} to register it",
                result.tool_name, token.token_id
            ),
            None => format!(
                "Design for '{}' rejected: {} blocking issue(s)",
                result.tool_name,
                result.issues.len()
            ),
        };
        respond(result.valid, message, &result)
    }
}

// ---------------------------------------------------------------------------
// verify_design_token
// ---------------------------------------------------------------------------

pub struct VerifyDesignTokenTool;

impl PlatformTool for VerifyDesignTokenTool {
    fn name(&self) -> &str {
        "verify_design_token"
    }

    fn description(&self) -> &str {
        "Report whether a design validation token is live, consumed or expired, without consuming it"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token_id": {"type": "string", "description": "Token from propose_tool_design"}
            },
            "required": ["token_id"]
        })
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let token_id = required_str(&args, "token_id")?;
        let v = services.registration.verify(token_id)?;
        respond(true, format!("Token {token_id} is {}", v.status), &v)
    }
}

// ---------------------------------------------------------------------------
// register_tool
// ---------------------------------------------------------------------------

pub struct RegisterToolTool;

impl PlatformTool for RegisterToolTool {
    fn name(&self) -> &str {
        "register_tool"
    }

    fn description(&self) -> &str {
        "Register a tool implementation. Requires the token issued for exactly this proposal; the token is consumed."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token_id": {"type": "string", "description": "Token from propose_tool_design"},
                "proposal": proposal_schema(),
                "implementation": {"type": "string", "description": "Implementation payload to store"}
            },
            "required": ["token_id", "proposal", "implementation"]
        })
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let token_id = required_str(&args, "token_id")?;
        let proposal = parse_proposal(required_arg(&args, "proposal")?)?;
        let implementation = required_str(&args, "implementation")?;
        let result = services
            .registration
            .register(token_id, &proposal, implementation)?;
        respond(true, result.message.clone(), &result)
    }
}

// ---------------------------------------------------------------------------
// list_registered_tools
// ---------------------------------------------------------------------------

pub struct ListRegisteredToolsTool;

impl PlatformTool for ListRegisteredToolsTool {
    fn name(&self) -> &str {
        "list_registered_tools"
    }

    fn description(&self) -> &str {
        "List tools registered through the design gate"
    }

    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn call(&self, _args: Value, services: &Services) -> Result<Value> {
        let tools: Vec<Value> = services
            .registration
            .registry()
            .list_registered()?
            .into_iter()
            .map(|t| {
                json!({
                    "tool_name": t.tool_name,
                    "layer": t.layer,
                    "purpose": t.purpose,
                    "content_hash": t.content_hash,
                    "registered_at": t.registered_at,
                })
            })
            .collect();
        respond(
            true,
            format!("{} registered tool(s)", tools.len()),
            &json!({ "tools": tools }),
        )
    }
}

// ---------------------------------------------------------------------------
// list_tool_proposals
// ---------------------------------------------------------------------------

pub struct ListToolProposalsTool;

impl PlatformTool for ListToolProposalsTool {
    fn name(&self) -> &str {
        "list_tool_proposals"
    }

    fn description(&self) -> &str {
        "Audit trail of every design that passed validation, registered or not"
    }

    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn call(&self, _args: Value, services: &Services) -> Result<Value> {
        let proposals = services.validator.proposals();
        respond(
            true,
            format!("{} validated proposal(s)", proposals.len()),
            &json!({ "count": proposals.len(), "proposals": proposals }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::services;
    use platform_core::ErrorKind;
    use tempfile::TempDir;

    fn proposal() -> Value {
        json!({
            "tool_name": "rotate_certificates",
            "purpose": "Rotate TLS certificates for a cluster by committing renewed secrets to Git",
            "layer": "platform",
            "dependencies": ["run_remote_command"],
            "mutates_system_state": true,
            "implementation_sketch": "Render the desired certificate manifest and commit it so the GitOps controller applies it"
        })
    }

    #[test]
    fn propose_register_list() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);

        let proposed = ProposeToolDesignTool.call(proposal(), &s).unwrap();
        assert_eq!(proposed["success"], true, "{proposed}");
        let token = proposed["token"]["token_id"].as_str().unwrap().to_string();

        let verified = VerifyDesignTokenTool
            .call(json!({"token_id": token}), &s)
            .unwrap();
        assert_eq!(verified["status"], "live");

        let registered = RegisterToolTool
            .call(
                json!({"token_id": token, "proposal": proposal(), "implementation": "fn rotate() {}"}),
                &s,
            )
            .unwrap();
        assert_eq!(registered["success"], true);
        assert_eq!(registered["tool_name"], "rotate_certificates");

        let listed = ListRegisteredToolsTool.call(json!({}), &s).unwrap();
        assert_eq!(listed["tools"][0]["tool_name"], "rotate_certificates");
        assert!(dir.path().join(".platform/tools/rotate_certificates.json").exists());

        let err = RegisterToolTool
            .call(
                json!({"token_id": token, "proposal": proposal(), "implementation": "fn rotate() {}"}),
                &s,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenAlreadyConsumed);
    }

    #[test]
    fn validated_proposals_are_listed_before_registration() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let empty = ListToolProposalsTool.call(json!({}), &s).unwrap();
        assert_eq!(empty["count"], 0);

        let proposed = ProposeToolDesignTool.call(proposal(), &s).unwrap();
        let listed = ListToolProposalsTool.call(json!({}), &s).unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["proposals"][0]["tool_name"], "rotate_certificates");
        assert_eq!(listed["proposals"][0]["layer"], "platform");
        assert_eq!(listed["proposals"][0]["token_id"], proposed["token"]["token_id"]);

        let registered = ListRegisteredToolsTool.call(json!({}), &s).unwrap();
        assert!(registered["tools"].as_array().unwrap().is_empty());
    }

    #[test]
    fn swapped_proposal_is_mismatch() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let proposed = ProposeToolDesignTool.call(proposal(), &s).unwrap();
        let token = proposed["token"]["token_id"].as_str().unwrap().to_string();

        let mut swapped = proposal();
        swapped["implementation_sketch"] = json!("ssh in and run the installer");
        let err = RegisterToolTool
            .call(
                json!({"token_id": token, "proposal": swapped, "implementation": "x"}),
                &s,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenMismatch);
    }

    #[test]
    fn invalid_design_has_no_token() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let mut bad = proposal();
        bad["implementation_sketch"] = json!("ssh to staging and run apt-get install cert-manager");
        let v = ProposeToolDesignTool.call(bad, &s).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["valid"], false);
        assert!(v.get("token").is_none());
        assert!(!v["issues"].as_array().unwrap().is_empty());
    }

    #[test]
    fn malformed_proposal_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let err = ProposeToolDesignTool
            .call(json!({"tool_name": "x", "layer": "galaxy"}), &s)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
