use crate::error::{PlatformError, Result};
use crate::proposal::{Layer, ToolProposal};
use crate::token::{verify_token, TokenKind, TokenStore, TokenVerification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// RegisteredTool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTool {
    pub tool_name: String,
    pub layer: Layer,
    pub purpose: String,
    pub proposal: ToolProposal,
    pub content_hash: String,
    /// Opaque payload supplied at registration.
    pub implementation: String,
    /// Validation token that authorised this registration.
    pub token_id: String,
    pub registered_at: DateTime<Utc>,
}

impl RegisteredTool {
    pub fn new(
        proposal: &ToolProposal,
        content_hash: String,
        implementation: String,
        token_id: String,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_name: proposal.tool_name.clone(),
            layer: proposal.layer,
            purpose: proposal.purpose.clone(),
            proposal: proposal.clone(),
            content_hash,
            implementation,
            token_id,
            registered_at,
        }
    }
}

// ---------------------------------------------------------------------------
// ToolRegistry
// ---------------------------------------------------------------------------

pub trait ToolRegistry: Send + Sync {
    /// Add `tool`. Fails with `ToolAlreadyRegistered` if the name is taken.
    fn register(&self, tool: RegisteredTool) -> Result<()>;

    fn get(&self, tool_name: &str) -> Result<Option<RegisteredTool>>;

    /// All registered tools, ordered by name.
    fn list_registered(&self) -> Result<Vec<RegisteredTool>>;
}

#[derive(Debug, Default)]
pub struct InMemoryToolRegistry {
    tools: Mutex<BTreeMap<String, RegisteredTool>>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn register(&self, tool: RegisteredTool) -> Result<()> {
        let mut tools = self.tools.lock().unwrap_or_else(|e| e.into_inner());
        if tools.contains_key(&tool.tool_name) {
            return Err(PlatformError::ToolAlreadyRegistered(tool.tool_name));
        }
        tools.insert(tool.tool_name.clone(), tool);
        Ok(())
    }

    fn get(&self, tool_name: &str) -> Result<Option<RegisteredTool>> {
        let tools = self.tools.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tools.get(tool_name).cloned())
    }

    fn list_registered(&self) -> Result<Vec<RegisteredTool>> {
        let tools = self.tools.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tools.values().cloned().collect())
    }
}

/// One JSON record per tool under `.platform/tools/`. Records are created
/// with no-clobber semantics, so a concurrent duplicate loses cleanly.
#[derive(Debug, Clone)]
pub struct FileToolRegistry {
    root: PathBuf,
}

impl FileToolRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, tool_name: &str) -> Result<PathBuf> {
        let safe = !tool_name.is_empty()
            && tool_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !safe {
            return Err(PlatformError::InvalidArgument(format!(
                "tool name '{tool_name}' cannot be used as a registry key"
            )));
        }
        Ok(crate::paths::tool_record_path(&self.root, tool_name))
    }
}

impl ToolRegistry for FileToolRegistry {
    fn register(&self, tool: RegisteredTool) -> Result<()> {
        let path = self.record_path(&tool.tool_name)?;
        let data = serde_json::to_vec_pretty(&tool)?;
        match crate::io::create_new(&path, &data) {
            Err(PlatformError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PlatformError::ToolAlreadyRegistered(tool.tool_name))
            }
            other => other,
        }
    }

    fn get(&self, tool_name: &str) -> Result<Option<RegisteredTool>> {
        let path = self.record_path(tool_name)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn list_registered(&self) -> Result<Vec<RegisteredTool>> {
        let dir = crate::paths::tools_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut tools = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<RegisteredTool>(&data) {
                Ok(tool) => tools.push(tool),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable tool record");
                }
            }
        }
        tools.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
        Ok(tools)
    }
}

// ---------------------------------------------------------------------------
// ToolRegistrationGate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub tool_name: String,
    pub content_hash: String,
    pub token_id: String,
    pub registered_at: DateTime<Utc>,
    pub message: String,
}

pub struct ToolRegistrationGate {
    store: Arc<dyn TokenStore>,
    registry: Arc<dyn ToolRegistry>,
}

impl ToolRegistrationGate {
    pub fn new(store: Arc<dyn TokenStore>, registry: Arc<dyn ToolRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &Arc<dyn ToolRegistry> {
        &self.registry
    }

    /// Redeem `token_id` for `proposal` and register `implementation` under
    /// its tool name.
    ///
    /// The token is consumed before the registry write. If the write fails
    /// the token stays consumed and the caller must re-propose.
    pub fn register(
        &self,
        token_id: &str,
        proposal: &ToolProposal,
        implementation: &str,
    ) -> Result<RegistrationResult> {
        if implementation.trim().is_empty() {
            return Err(PlatformError::InvalidArgument(
                "implementation payload is empty".to_string(),
            ));
        }
        let content_hash = proposal.content_hash()?;

        let token = self
            .store
            .consume_if_unconsumed(token_id, TokenKind::Validation, &content_hash)
            .inspect_err(|e| {
                tracing::warn!(token = %token_id, tool = %proposal.tool_name, error = %e, "registration refused");
            })?;

        let registered_at = self.store.now();
        let record = RegisteredTool::new(
            proposal,
            content_hash.clone(),
            implementation.to_string(),
            token.token_id.clone(),
            registered_at,
        );
        self.registry.register(record).inspect_err(|e| {
            tracing::warn!(token = %token_id, tool = %proposal.tool_name, error = %e, "registration failed after token consumption");
        })?;

        tracing::info!(tool = %proposal.tool_name, token = %token_id, "tool registered");
        Ok(RegistrationResult {
            tool_name: proposal.tool_name.clone(),
            content_hash,
            token_id: token.token_id,
            registered_at,
            message: format!("Tool '{}' registered", proposal.tool_name),
        })
    }

    pub fn verify(&self, token_id: &str) -> Result<TokenVerification> {
        verify_token(self.store.as_ref(), token_id, TokenKind::Validation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
