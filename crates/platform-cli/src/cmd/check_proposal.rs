use crate::output::print_json;
use anyhow::Context;
use platform_core::config::Config;
use platform_core::proposal::ToolProposal;
use platform_core::registry::FileToolRegistry;
use platform_core::rules::Severity;
use platform_core::token::InMemoryTokenStore;
use platform_core::validator::DesignProposalValidator;
use std::path::Path;
use std::sync::Arc;

/// Lint a proposal file against the design rules. Exits nonzero when any
/// blocking rule fires. The token a server would issue is not shown.
pub fn run(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let proposal: ToolProposal = serde_yaml::from_str(&data)
        .with_context(|| format!("{} is not a valid tool proposal", file.display()))?;

    let config = Config::load(root).context("failed to load config")?;
    let store = Arc::new(InMemoryTokenStore::new(config.token_ttl()));
    let validator = DesignProposalValidator::new(config, store)
        .with_registry(Arc::new(FileToolRegistry::new(root)));
    let mut result = validator.propose(&proposal)?;
    result.token = None;

    if json {
        print_json(&result)?;
    } else {
        let verdict = if result.valid { "valid" } else { "rejected" };
        println!("{}: {verdict}", result.tool_name);
        println!("content hash: {}", result.content_hash);
        for f in &result.findings {
            let tag = match f.severity {
                Severity::Blocking => "blocking",
                Severity::Warning => "warning",
            };
            println!("[{tag}] {}: {}", f.rule, f.message);
        }
    }

    if !result.valid {
        anyhow::bail!(
            "proposal '{}' has {} blocking issue(s)",
            result.tool_name,
            result.issues.len()
        );
    }
    Ok(())
}
