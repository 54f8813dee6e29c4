use crate::config::Config;
use crate::proposal::{Layer, ToolProposal};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// RuleContext / Finding
// ---------------------------------------------------------------------------

pub struct RuleContext<'a> {
    pub proposal: &'a ToolProposal,
    pub config: &'a Config,
    /// Capabilities that already exist (built-in tools plus registered ones).
    pub known_capabilities: &'a [String],
    /// Compiled identifier patterns: the cluster allow-list first, then
    /// `config.hardcoded_patterns`.
    pub identifier_patterns: &'a [(String, Regex)],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Makes the proposal invalid.
    Blocking,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A fn-pointer rule. Pure: the same context always yields the same messages.
pub struct Rule {
    pub id: &'static str,
    /// One-line statement of what the rule requires.
    pub summary: &'static str,
    pub severity: Severity,
    pub check: fn(&RuleContext) -> Vec<String>,
}

impl Rule {
    pub fn evaluate(&self, ctx: &RuleContext) -> Vec<Finding> {
        (self.check)(ctx)
            .into_iter()
            .map(|message| Finding {
                rule: self.id,
                severity: self.severity,
                message,
            })
            .collect()
    }
}

/// Build the identifier pattern list for [`RuleContext`]. Entries in
/// `hardcoded_patterns` that are not valid regexes are skipped; config
/// validation reports them.
pub fn identifier_patterns(config: &Config) -> Vec<(String, Regex)> {
    let clusters = config.clusters.iter().filter_map(|c| {
        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(c)))
            .ok()
            .map(|re| (c.clone(), re))
    });
    let extra = config
        .hardcoded_patterns
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok().map(|re| (p.clone(), re)));
    clusters.chain(extra).collect()
}

// ---------------------------------------------------------------------------
// Pattern helpers
// ---------------------------------------------------------------------------

fn compiled(cell: &'static OnceLock<Vec<Regex>>, patterns: &[&str]) -> &'static [Regex] {
    cell.get_or_init(|| {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("valid regex"))
            .collect()
    })
}

fn imperative_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(
        &CELL,
        &[
            r"(?i)\.sh\s+script",
            r"(?i)bash.*install",
            r"(?i)manual.*installation",
            r"(?i)install\.sh",
            r"(?i)\bimperative\b",
            r"(?i)ad[- ]hoc\s+script",
        ],
    )
}

const DECLARATIVE_MARKERS: &[&str] = &[
    "ansible",
    "playbook",
    "terraform",
    "helm",
    "kustomize",
    "kustomization",
    "gitops",
    "flux",
    "declarative",
    "infrastructure as code",
    "infrastructure-as-code",
];

fn concrete_dependency_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(
        &CELL,
        &[
            r"(?i)\b(ssh|scp|subprocess|bash|shell|curl|wget|kubectl|tsh|os\.system)\b",
            r"(?i)directly calls",
            r"(?i)hardcoded.*command",
            r"(?i)assumes.*exists",
        ],
    )
}

const TEAM_KEYWORDS: &[&str] = &["flux", "kustomization", "k8s-master"];

const COUPLING_KEYWORDS: &[&str] = &["import", "internal", "private"];

const ACTION_VERBS: &[&str] = &[
    "analyze", "apply", "approve", "backup", "build", "check", "clean", "configure", "create",
    "delete", "deploy", "download", "execute", "fetch", "generate", "get", "install", "list",
    "migrate", "monitor", "notify", "provision", "query", "read", "reconcile", "register",
    "remove", "report", "restart", "restore", "resume", "rotate", "run", "scale", "send", "show",
    "start", "stop", "suspend", "sync", "trigger", "update", "upload", "validate", "watch",
    "write",
];

fn clause_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s+(?:and then|and also|as well as|and|then|also|plus)\s+|[;,&]")
            .expect("valid regex")
    })
}

fn tool_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("valid regex"))
}

fn god_tool_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)action.*parameter").expect("valid regex"))
}

fn is_action_verb(word: &str) -> bool {
    let w = word.to_ascii_lowercase();
    let w = w.trim_matches(|c: char| !c.is_ascii_alphabetic());
    if ACTION_VERBS.contains(&w) {
        return true;
    }
    // "deploys" -> "deploy", "fetches" -> "fetch"
    let stemmed = [w.strip_suffix("es"), w.strip_suffix('s')]
        .into_iter()
        .flatten()
        .any(|stem| ACTION_VERBS.contains(&stem));
    stemmed
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn hardcoded_identifiers(ctx: &RuleContext) -> Vec<String> {
    let p = ctx.proposal;
    let mut out = Vec::new();
    for (label, re) in ctx.identifier_patterns {
        if re.is_match(&p.implementation_sketch) {
            out.push(format!(
                "implementation_sketch hardcodes '{label}'; read environment identifiers from configuration"
            ));
        }
        for dep in p.dependencies.iter().filter(|d| re.is_match(d)) {
            out.push(format!(
                "dependency '{dep}' hardcodes '{label}'; depend on a capability, not an environment"
            ));
        }
    }
    out
}

fn platform_state_changes_are_declarative(ctx: &RuleContext) -> Vec<String> {
    let p = ctx.proposal;
    if !(p.mutates_system_state && p.layer == Layer::Platform) {
        return Vec::new();
    }
    let mut out: Vec<String> = imperative_patterns()
        .iter()
        .filter(|re| re.is_match(&p.implementation_sketch))
        .map(|re| {
            format!(
                "imperative state change ('{}'); platform state changes must go through declarative configuration such as Ansible playbooks",
                re.as_str().trim_start_matches("(?i)")
            )
        })
        .collect();
    if out.is_empty() && !contains_any(&p.implementation_sketch, DECLARATIVE_MARKERS) {
        out.push(
            "mutating platform tool does not reference a declarative mechanism (Ansible, Terraform, Helm, GitOps)"
                .to_string(),
        );
    }
    out
}

fn dependencies_are_capabilities(ctx: &RuleContext) -> Vec<String> {
    ctx.proposal
        .dependencies
        .iter()
        .filter(|dep| {
            !ctx.known_capabilities
                .iter()
                .any(|k| k.eq_ignore_ascii_case(dep.trim()))
        })
        .filter(|dep| concrete_dependency_patterns().iter().any(|re| re.is_match(dep)))
        .map(|dep| {
            format!(
                "dependency '{dep}' names a low-level mechanism; compose an existing capability such as run_remote_command instead"
            )
        })
        .collect()
}

fn single_responsibility(ctx: &RuleContext) -> Vec<String> {
    let actions: Vec<&str> = clause_split_re()
        .split(&ctx.proposal.purpose)
        .filter_map(|clause| clause.split_whitespace().next())
        .filter(|w| is_action_verb(w))
        .collect();
    if actions.len() >= 2 {
        vec![format!(
            "purpose combines {} actions ({}); consider one tool per action",
            actions.len(),
            actions.join(", ")
        )]
    } else {
        Vec::new()
    }
}

fn tool_name_format(ctx: &RuleContext) -> Vec<String> {
    let name = &ctx.proposal.tool_name;
    if tool_name_re().is_match(name) {
        Vec::new()
    } else {
        vec![format!(
            "tool_name '{name}' must be snake_case: a lowercase letter followed by lowercase letters, digits or underscores"
        )]
    }
}

fn purpose_present(ctx: &RuleContext) -> Vec<String> {
    if ctx.proposal.purpose.trim().is_empty() {
        vec!["purpose is empty; state in one sentence what the tool does".to_string()]
    } else {
        Vec::new()
    }
}

fn platform_is_team_agnostic(ctx: &RuleContext) -> Vec<String> {
    let p = ctx.proposal;
    if p.layer == Layer::Platform && contains_any(&p.purpose, TEAM_KEYWORDS) {
        vec!["platform tool purpose has team-specific assumptions; platform tools should work for any team".to_string()]
    } else {
        Vec::new()
    }
}

fn non_platform_imperative(ctx: &RuleContext) -> Vec<String> {
    let p = ctx.proposal;
    if p.mutates_system_state
        && p.layer != Layer::Platform
        && imperative_patterns()
            .iter()
            .any(|re| re.is_match(&p.implementation_sketch))
    {
        vec![format!(
            "{} tool changes system state with imperative scripts; prefer a playbook",
            p.layer
        )]
    } else {
        Vec::new()
    }
}

fn no_god_tools(ctx: &RuleContext) -> Vec<String> {
    if god_tool_re().is_match(&ctx.proposal.implementation_sketch) {
        vec!["dispatches on an action parameter; tools should be focused and single-purpose".to_string()]
    } else {
        Vec::new()
    }
}

fn loose_coupling(ctx: &RuleContext) -> Vec<String> {
    let deps = ctx.proposal.dependencies.join(" ");
    if contains_any(&deps, COUPLING_KEYWORDS) {
        vec!["dependencies reach into internal/private modules of another layer".to_string()]
    } else {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Default rules (evaluation order)
// ---------------------------------------------------------------------------

pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "hardcoded_identifiers",
            summary: "No cluster, host or gateway identifiers baked into the design; take them as parameters.",
            severity: Severity::Blocking,
            check: hardcoded_identifiers,
        },
        Rule {
            id: "declarative_state_changes",
            summary: "Platform tools that change system state go through declarative tooling, not imperative scripts.",
            severity: Severity::Blocking,
            check: platform_state_changes_are_declarative,
        },
        Rule {
            id: "dependency_abstraction",
            summary: "Depend on existing capabilities rather than raw transports such as ssh or kubectl.",
            severity: Severity::Warning,
            check: dependencies_are_capabilities,
        },
        Rule {
            id: "single_responsibility",
            summary: "The purpose names one action; split tools that do several things.",
            severity: Severity::Warning,
            check: single_responsibility,
        },
        Rule {
            id: "tool_name_format",
            summary: "Tool names are snake_case, start with a letter and are at most 64 characters.",
            severity: Severity::Blocking,
            check: tool_name_format,
        },
        Rule {
            id: "purpose_present",
            summary: "Every proposal states its purpose.",
            severity: Severity::Blocking,
            check: purpose_present,
        },
        Rule {
            id: "platform_team_agnostic",
            summary: "Platform-layer tools make no team-specific assumptions.",
            severity: Severity::Warning,
            check: platform_is_team_agnostic,
        },
        Rule {
            id: "non_platform_imperative",
            summary: "Team and personal tools that mutate state avoid ad hoc install scripts.",
            severity: Severity::Warning,
            check: non_platform_imperative,
        },
        Rule {
            id: "god_tool",
            summary: "No action parameter that switches between unrelated behaviours.",
            severity: Severity::Warning,
            check: no_god_tools,
        },
        Rule {
            id: "tight_coupling",
            summary: "No reliance on another tool's internal or private modules.",
            severity: Severity::Warning,
            check: loose_coupling,
        },
    ]
}
