//! Design proposal validation.
//!
//! Every call runs the full rule table from scratch and reports all findings
//! in one pass. A proposal with no blocking findings gets a validation token
//! bound to its content hash; that token is the only way through
//! [`ToolRegistrationGate`](crate::registry::ToolRegistrationGate).
//! Accepted proposals are appended to an in-process audit log whether or not
//! they are later registered.

use crate::config::Config;
use crate::error::Result;
use crate::proposal::{Layer, ToolProposal};
use crate::registry::ToolRegistry;
use crate::rules::{default_rules, identifier_patterns, Finding, Rule, RuleContext, Severity};
use crate::token::{Token, TokenKind, TokenStore};
use regex::Regex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Capabilities shipped with the server. New tools should compose these.
pub const BUILTIN_CAPABILITIES: &[&str] = &[
    "run_remote_command",
    "list_nodes",
    "verify_access",
    "list_managed_resources",
    "set_resource_suspended",
    "get_resource_events",
    "get_logs",
    "list_git_sources",
    "get_resource_details",
];

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub tool_name: String,
    pub content_hash: String,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
}

/// Audit entry for a proposal that passed validation.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalRecord {
    pub tool_name: String,
    pub layer: Layer,
    pub content_hash: String,
    pub token_id: String,
    pub warnings: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub rule: &'static str,
    pub severity: Severity,
    pub requirement: &'static str,
}

pub struct DesignProposalValidator {
    config: Config,
    rules: Vec<Rule>,
    patterns: Vec<(String, Regex)>,
    store: Arc<dyn TokenStore>,
    registry: Option<Arc<dyn ToolRegistry>>,
    log: Mutex<Vec<ProposalRecord>>,
}

impl DesignProposalValidator {
    pub fn new(config: Config, store: Arc<dyn TokenStore>) -> Self {
        Self::with_rules(config, store, default_rules())
    }

    pub fn with_rules(config: Config, store: Arc<dyn TokenStore>, rules: Vec<Rule>) -> Self {
        let patterns = identifier_patterns(&config);
        Self {
            config,
            rules,
            patterns,
            store,
            registry: None,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Treat tools already in `registry` as known capabilities.
    pub fn with_registry(mut self, registry: Arc<dyn ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    fn known_capabilities(&self) -> Result<Vec<String>> {
        let mut known: Vec<String> = BUILTIN_CAPABILITIES.iter().map(|s| s.to_string()).collect();
        if let Some(registry) = &self.registry {
            known.extend(registry.list_registered()?.into_iter().map(|t| t.tool_name));
        }
        Ok(known)
    }

    /// Run every rule against `proposal`. Issues a token only when no
    /// blocking finding was produced.
    pub fn propose(&self, proposal: &ToolProposal) -> Result<ValidationResult> {
        let known = self.known_capabilities()?;
        let ctx = RuleContext {
            proposal,
            config: &self.config,
            known_capabilities: &known,
            identifier_patterns: &self.patterns,
        };

        let findings: Vec<Finding> = self.rules.iter().flat_map(|r| r.evaluate(&ctx)).collect();
        let (blocking, advisory): (Vec<&Finding>, Vec<&Finding>) = findings
            .iter()
            .partition(|f| f.severity == Severity::Blocking);
        let issues: Vec<String> = blocking.iter().map(|f| f.message.clone()).collect();
        let warnings: Vec<String> = advisory.iter().map(|f| f.message.clone()).collect();

        let content_hash = proposal.content_hash()?;
        let valid = issues.is_empty();
        let token = if valid {
            Some(self.store.issue(TokenKind::Validation, &content_hash)?)
        } else {
            None
        };

        if let Some(token) = &token {
            tracing::info!(tool = %proposal.tool_name, warnings = warnings.len(), "design proposal accepted");
            self.log
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(ProposalRecord {
                    tool_name: proposal.tool_name.clone(),
                    layer: proposal.layer,
                    content_hash: content_hash.clone(),
                    token_id: token.token_id.clone(),
                    warnings: warnings.clone(),
                    validated_at: self.store.now(),
                });
        } else {
            tracing::info!(tool = %proposal.tool_name, issues = issues.len(), "design proposal rejected");
        }

        Ok(ValidationResult {
            valid,
            tool_name: proposal.tool_name.clone(),
            content_hash,
            issues,
            warnings,
            findings,
            token,
        })
    }

    /// Every accepted proposal, oldest first.
    pub fn proposals(&self) -> Vec<ProposalRecord> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The rules this validator applies, in evaluation order.
    pub fn checklist(&self) -> Vec<ChecklistItem> {
        self.rules
            .iter()
            .map(|r| ChecklistItem {
                rule: r.id,
                severity: r.severity,
                requirement: r.summary,
            })
            .collect()
    }
}
