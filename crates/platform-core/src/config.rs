use crate::error::{PlatformError, Result};
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Startup configuration. Every field has a default so a missing or partial
/// `.platform/config.yaml` still yields a usable, fail-closed setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Cluster identities that may be targeted. Anything else is rejected
    /// before a process is spawned.
    #[serde(default = "default_clusters")]
    pub clusters: Vec<String>,
    #[serde(default = "default_user")]
    pub default_user: String,
    #[serde(default = "default_forbidden_users")]
    pub forbidden_users: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsh_binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_connector: Option<String>,
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,
    #[serde(default = "default_list_timeout")]
    pub list_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub use_sudo: bool,
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    #[serde(default = "default_log_components")]
    pub log_components: Vec<String>,
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: u32,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Extra regexes flagged by the hardcoded-identifier design rule, on top
    /// of the cluster names themselves.
    #[serde(default = "default_hardcoded_patterns")]
    pub hardcoded_patterns: Vec<String>,
}

fn default_clusters() -> Vec<String> {
    vec![
        "staging".to_string(),
        "production".to_string(),
        "shared-service".to_string(),
    ]
}

fn default_user() -> String {
    "platform-ops".to_string()
}

fn default_forbidden_users() -> Vec<String> {
    vec![
        "root".to_string(),
        "admin".to_string(),
        "administrator".to_string(),
    ]
}

fn default_timeout() -> u64 {
    30
}

fn default_list_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "flux-system".to_string()
}

fn default_log_components() -> Vec<String> {
    vec![
        "kustomize-controller".to_string(),
        "source-controller".to_string(),
        "helm-controller".to_string(),
        "notification-controller".to_string(),
    ]
}

fn default_max_log_lines() -> u32 {
    5000
}

/// One year. Longer lifetimes defeat the audit window.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_hardcoded_patterns() -> Vec<String> {
    vec![
        r"teleport\.[a-z0-9.-]+".to_string(),
        r"ALLOWED_CLUSTERS\s*=".to_string(),
        r"\b\d{1,3}(\.\d{1,3}){3}\b".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clusters: default_clusters(),
            default_user: default_user(),
            forbidden_users: default_forbidden_users(),
            tsh_binary: None,
            proxy: None,
            auth_connector: None,
            default_timeout_seconds: default_timeout(),
            list_timeout_seconds: default_list_timeout(),
            use_sudo: true,
            default_namespace: default_namespace(),
            log_components: default_log_components(),
            max_log_lines: default_max_log_lines(),
            token_ttl_hours: default_token_ttl_hours(),
            hardcoded_patterns: default_hardcoded_patterns(),
        }
    }
}

impl Config {
    /// Load `.platform/config.yaml` under `root`, falling back to defaults
    /// when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn is_allowed_cluster(&self, cluster: &str) -> bool {
        self.clusters.iter().any(|c| c == cluster)
    }

    pub fn is_forbidden_user(&self, user: &str) -> bool {
        self.forbidden_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case(user))
    }

    /// Token lifetime, clamped to `0..=MAX_TOKEN_TTL_HOURS`.
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours.clamp(0, MAX_TOKEN_TTL_HOURS))
    }

    /// Human-readable login step for a cluster, used in remediation hints.
    pub fn login_hint(&self, cluster: &str) -> String {
        let mut cmd = String::from("tsh login");
        if let Some(proxy) = &self.proxy {
            cmd.push_str(&format!(" --proxy={proxy}"));
        }
        if let Some(auth) = &self.auth_connector {
            cmd.push_str(&format!(" --auth={auth}"));
        }
        cmd.push(' ');
        cmd.push_str(cluster);
        format!("Log in manually, then retry: {cmd}")
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.clusters.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "clusters allow-list is empty; every target would be rejected".into(),
            });
        }

        if self.default_user.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "default_user is empty".into(),
            });
        } else if self.is_forbidden_user(&self.default_user) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "default_user '{}' is a privileged account; use a named non-privileged user",
                    self.default_user
                ),
            });
        }

        for pattern in &self.hardcoded_patterns {
            if let Err(e) = Regex::new(pattern) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("hardcoded_patterns entry '{pattern}' is not a valid regex: {e}"),
                });
            }
        }

        if self.default_timeout_seconds == 0 || self.list_timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "a timeout of 0 seconds fails every command immediately".into(),
            });
        }

        if self.token_ttl_hours <= 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "token_ttl_hours must be positive (got {})",
                    self.token_ttl_hours
                ),
            });
        } else if self.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "token_ttl_hours must be at most {MAX_TOKEN_TTL_HOURS} (got {})",
                    self.token_ttl_hours
                ),
            });
        }

        if self.log_components.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "log_components is empty; get_logs will reject every component".into(),
            });
        }

        warnings
    }

    /// Fail with `InvalidConfig` on the first error-level finding.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(PlatformError::InvalidConfig(w.message)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert!(cfg.is_allowed_cluster("staging"));
        assert!(!cfg.is_allowed_cluster("dev"));
        assert_eq!(cfg.default_namespace, "flux-system");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".platform")).unwrap();
        std::fs::write(
            dir.path().join(".platform/config.yaml"),
            "clusters: [lab]\ndefault_user: deployer\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.clusters, vec!["lab".to_string()]);
        assert_eq!(cfg.default_user, "deployer");
        assert_eq!(cfg.default_timeout_seconds, 30);
        assert_eq!(cfg.token_ttl_hours, 24);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_yaml::from_str::<Config>("clusterz: [lab]\n");
        assert!(result.is_err(), "typo in field name should be rejected");
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.proxy = Some("gateway.example.net:443".into());
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.proxy.as_deref(), Some("gateway.example.net:443"));
    }

    #[test]
    fn privileged_default_user_is_an_error() {
        let cfg = Config {
            default_user: "Root".into(),
            ..Config::default()
        };
        assert!(matches!(
            cfg.ensure_valid(),
            Err(PlatformError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bad_regex_and_ttl_reported() {
        let cfg = Config {
            hardcoded_patterns: vec!["(".into()],
            token_ttl_hours: 0,
            ..Config::default()
        };
        let errors: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn oversized_ttl_is_rejected_and_clamped() {
        let cfg = Config {
            token_ttl_hours: 10_000_000_000,
            ..Config::default()
        };
        assert!(matches!(
            cfg.ensure_valid(),
            Err(PlatformError::InvalidConfig(_))
        ));
        assert_eq!(cfg.token_ttl(), chrono::Duration::hours(MAX_TOKEN_TTL_HOURS));

        let store = crate::token::InMemoryTokenStore::new(cfg.token_ttl());
        let token = crate::token::TokenStore::issue(&store, crate::token::TokenKind::Validation, "h")
            .unwrap();
        assert!(token.expires_at > token.issued_at);
    }

    #[test]
    fn login_hint_includes_proxy_and_connector() {
        let cfg = Config {
            proxy: Some("gw.example.net:443".into()),
            auth_connector: Some("okta".into()),
            ..Config::default()
        };
        let hint = cfg.login_hint("staging");
        assert!(hint.contains("tsh login --proxy=gw.example.net:443 --auth=okta staging"));
    }
}
