use crate::resources;
use crate::tools::{self, Services};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::Path;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ToolContent {
    r#type: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct ToolCallResult {
    content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Server loop
// ---------------------------------------------------------------------------

pub fn run(root: &Path) -> anyhow::Result<()> {
    let services = Services::load(root).context("failed to start platform services")?;
    let tools = tools::all_tools();
    tracing::info!(root = %root.display(), tools = tools.len(), "mcp server ready");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match handle_line(&line, &tools, &services) {
            Some(r) => r,
            None => continue,
        };
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &response)?;
        writeln!(out)?;
        out.flush()?;
    }

    Ok(())
}

/// Parse and answer one line. `None` for notifications, which get no reply.
pub fn handle_line(
    line: &str,
    tools: &[Box<dyn tools::PlatformTool>],
    services: &Services,
) -> Option<JsonRpcResponse> {
    let raw: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Some(JsonRpcResponse::err(None, -32700, format!("parse error: {e}"))),
    };

    // Notifications have no "id" key
    if !raw
        .as_object()
        .map(|o| o.contains_key("id"))
        .unwrap_or(false)
    {
        return None;
    }

    match serde_json::from_value::<JsonRpcRequest>(raw) {
        Ok(request) => Some(handle_request(&request, tools, services)),
        Err(e) => Some(JsonRpcResponse::err(
            None,
            -32600,
            format!("invalid request: {e}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Request dispatch (pub for unit tests)
// ---------------------------------------------------------------------------

pub fn handle_request(
    req: &JsonRpcRequest,
    tools: &[Box<dyn tools::PlatformTool>],
    services: &Services,
) -> JsonRpcResponse {
    match req.method.as_str() {
        "initialize" => JsonRpcResponse::ok(
            req.id.clone(),
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {},
                    "resources": {}
                },
                "serverInfo": {
                    "name": "platform",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        ),

        "tools/list" => {
            let tool_list: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name(),
                        "description": t.description(),
                        "inputSchema": t.schema()
                    })
                })
                .collect();
            JsonRpcResponse::ok(req.id.clone(), serde_json::json!({ "tools": tool_list }))
        }

        "tools/call" => {
            let params = match &req.params {
                Some(p) => p,
                None => return JsonRpcResponse::err(req.id.clone(), -32602, "missing params"),
            };

            let tool_name = match params["name"].as_str() {
                Some(n) => n,
                None => {
                    return JsonRpcResponse::err(
                        req.id.clone(),
                        -32602,
                        "missing tool name in params",
                    )
                }
            };

            let args = params.get("arguments").cloned().unwrap_or(Value::Null);

            match tools.iter().find(|t| t.name() == tool_name) {
                None => JsonRpcResponse::err(
                    req.id.clone(),
                    -32601,
                    format!("tool not found: {tool_name}"),
                ),
                Some(tool) => {
                    let (value, is_error) = match tool.call(args, services) {
                        Ok(v) => (v, false),
                        Err(e) => {
                            tracing::warn!(tool = %tool_name, kind = %e.kind(), error = %e, "tool call failed");
                            (tools::failure(&e), true)
                        }
                    };
                    let text = serde_json::to_string_pretty(&value)
                        .unwrap_or_else(|e| format!("serialization error: {e}"));

                    let call_result = ToolCallResult {
                        content: vec![ToolContent {
                            r#type: "text",
                            text,
                        }],
                        is_error,
                    };

                    JsonRpcResponse::ok(
                        req.id.clone(),
                        serde_json::to_value(&call_result)
                            .unwrap_or_else(|e| serde_json::json!({"error": e.to_string()})),
                    )
                }
            }
        }

        "resources/list" => JsonRpcResponse::ok(
            req.id.clone(),
            serde_json::json!({ "resources": resources::list() }),
        ),

        "resources/read" => {
            let uri = match req.params.as_ref().and_then(|p| p["uri"].as_str()) {
                Some(u) => u,
                None => return JsonRpcResponse::err(req.id.clone(), -32602, "missing resource uri"),
            };
            match resources::read(uri, services) {
                None => JsonRpcResponse::err(
                    req.id.clone(),
                    -32602,
                    format!("resource not found: {uri}"),
                ),
                Some(Err(e)) => JsonRpcResponse::err(req.id.clone(), -32603, e.to_string()),
                Some(Ok(text)) => JsonRpcResponse::ok(
                    req.id.clone(),
                    serde_json::json!({
                        "contents": [{ "uri": uri, "mimeType": "application/yaml", "text": text }]
                    }),
                ),
            }
        }

        other => JsonRpcResponse::err(
            req.id.clone(),
            -32601,
            format!("method not found: {other}"),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
