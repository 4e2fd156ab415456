mod llm;
mod observability;
mod ratelimit;
mod tools;
mod worker;
mod workspace;

pub use llm::*;
pub use observability::*;
pub use ratelimit::*;
pub use tools::*;
pub use worker::*;
pub use workspace::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Pre-spawned worker pool settings.
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    /// Multi-scope rate limiter settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Warn when no LLM providers are configured.
        if self.llm.providers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }

        if self.llm.startup_policy == LlmStartupPolicy::RequireOne && self.llm.providers.is_empty()
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.startup_policy".into(),
                message: "require_one startup policy set but no providers configured".into(),
            });
        }

        // Track seen provider IDs for duplicate detection.
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: "provider base_url must not be empty".into(),
                });
            }
            if !provider.base_url.is_empty()
                && !provider.base_url.starts_with("http://")
                && !provider.base_url.starts_with("https://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        provider.base_url
                    ),
                });
            }

            if !provider.id.is_empty() && !seen_ids.insert(&provider.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.providers[{i}].id"),
                    message: format!(
                        "duplicate provider id \"{}\" — later provider will shadow earlier one",
                        provider.id
                    ),
                });
            }

            let needs_credentials =
                matches!(provider.auth.mode, AuthMode::ApiKey | AuthMode::QueryParam);
            if needs_credentials {
                let has_env = provider.auth.env.as_ref().is_some_and(|v| !v.is_empty());
                let has_key = provider.auth.key.as_ref().is_some_and(|v| !v.is_empty());
                let has_keys = !provider.auth.keys.is_empty();
                if !has_env && !has_key && !has_keys {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("llm.providers[{i}].auth"),
                        message: format!(
                            "provider \"{}\" uses {:?} auth mode but has no auth.env, auth.key, or auth.keys configured",
                            provider.id, provider.auth.mode
                        ),
                    });
                }
            }
        }

        // Validate exec security denied patterns are valid regexes.
        for (i, pattern) in self.tools.exec_security.denied_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("tools.exec_security.denied_patterns[{i}]"),
                    message: format!("invalid regex \"{pattern}\": {e}"),
                });
            }
        }

        // worker_pool.target_size must be non-zero.
        if self.worker_pool.target_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "worker_pool.target_size".into(),
                message: "target_size must be greater than 0".into(),
            });
        }

        if self.worker_pool.max_parallel_spawn == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "worker_pool.max_parallel_spawn".into(),
                message: "max_parallel_spawn must be greater than 0".into(),
            });
        }

        // rate_limit: every configured scope's burst_size, if present,
        // must be non-zero.
        for (key, limits) in self.rate_limit.scopes.iter() {
            if let Some(burst) = limits.burst_size {
                if burst == 0 {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("rate_limit.scopes.{key}.burst_size"),
                        message: "burst_size must be greater than 0 when set".into(),
                    });
                }
            }
            if limits.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("rate_limit.scopes.{key}"),
                    message: "scope has no limits set and will never be consulted".into(),
                });
            }
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            llm: LlmConfig {
                providers: vec![ProviderConfig {
                    id: "openai".into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: "https://api.openai.com/v1".into(),
                    auth: AuthConfig {
                        mode: AuthMode::ApiKey,
                        env: Some("OPENAI_API_KEY".into()),
                        ..AuthConfig::default()
                    },
                    default_model: None,
                }],
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn provider_base_url_invalid_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].base_url = "ws://localhost:1234".into();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers[0].base_url")
            .expect("expected provider base_url error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn provider_api_key_mode_no_credentials_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].auth = AuthConfig {
            mode: AuthMode::ApiKey,
            env: None,
            key: None,
            keys: vec![],
            ..AuthConfig::default()
        };
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers[0].auth").expect("expected auth error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn require_one_with_no_providers_is_error() {
        let mut cfg = Config::default();
        cfg.llm.startup_policy = LlmStartupPolicy::RequireOne;
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "llm.startup_policy").expect("expected startup_policy error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn duplicate_provider_ids_is_warning() {
        let mut cfg = valid_config();
        let mut second = cfg.llm.providers[0].clone();
        second.auth.env = Some("OPENAI_API_KEY_2".into());
        cfg.llm.providers.push(second);
        let issues = cfg.validate();
        let dup_issues: Vec<_> = issues
            .iter()
            .filter(|e| e.message.contains("duplicate provider id"))
            .collect();
        assert_eq!(dup_issues.len(), 1);
        assert_eq!(dup_issues[0].severity, ConfigSeverity::Warning);
    }

    #[test]
    fn invalid_denied_pattern_is_error() {
        let mut cfg = valid_config();
        cfg.tools.exec_security.denied_patterns = vec![r"[invalid".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "tools.exec_security.denied_patterns[0]")
            .expect("expected regex error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn worker_pool_zero_target_size_is_error() {
        let mut cfg = valid_config();
        cfg.worker_pool.target_size = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "worker_pool.target_size")
            .expect("expected target_size error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn rate_limit_zero_burst_is_error() {
        let mut cfg = valid_config();
        cfg.rate_limit.scopes.insert(
            "global".into(),
            ScopeLimits {
                requests_per_minute: Some(10),
                burst_size: Some(0),
                ..Default::default()
            },
        );
        let issues = cfg.validate();
        let issue = find_issue(&issues, "rate_limit.scopes.global.burst_size")
            .expect("expected burst_size error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn empty_scope_is_warning() {
        let mut cfg = valid_config();
        cfg.rate_limit
            .scopes
            .insert("global".into(), ScopeLimits::default());
        let issues = cfg.validate();
        let issue = find_issue(&issues, "rate_limit.scopes.global")
            .expect("expected empty-scope warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn no_providers_is_warning() {
        let cfg = Config::default();
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "llm.providers").expect("expected no-providers warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "worker_pool.target_size".into(),
            message: "target_size must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] worker_pool.target_size: target_size must be greater than 0"
        );
    }
}
