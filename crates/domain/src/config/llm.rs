use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_20000u")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Startup policy for LLM providers.
    ///
    /// - `allow_none` (default): the executor boots even if zero providers
    ///   init — plans that don't call an LLM-backed tool still run.
    /// - `require_one`: abort startup if no providers successfully init.
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
    /// Model roles (planner, executor, summarizer, embedder + custom),
    /// keyed by role name.
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            max_retries: 2,
            startup_policy: LlmStartupPolicy::AllowNone,
            roles: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

/// Controls how the executor handles LLM provider initialization at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    /// Boots even if no LLM providers initialize. Plans that never
    /// reach an LLM-backed tool still run; others fail at that task.
    #[default]
    AllowNone,
    /// Abort startup if no LLM providers successfully initialize.
    RequireOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Format: "provider_id/model_name"
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
    #[serde(default)]
    pub require_streaming: bool,
    #[serde(default)]
    pub fallbacks: Vec<FallbackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    Anthropic,
    AzureOpenai,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env).
    #[serde(default)]
    pub key: Option<String>,
    /// Multiple env var names for round-robin key rotation.
    /// When non-empty, takes precedence over `env`/`key`.
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    QueryParam,
    AwsSigv4,
    None,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_20000u() -> u64 {
    20_000
}
fn d_2() -> u32 {
    2
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_config_default_has_empty_providers() {
        let config = LlmConfig::default();
        assert!(config.providers.is_empty());
        assert_eq!(config.startup_policy, LlmStartupPolicy::AllowNone);
    }

    #[test]
    fn provider_config_deserializes() {
        let json = r#"{
            "id": "openai",
            "kind": "openai_compat",
            "base_url": "https://api.openai.com/v1",
            "auth": { "mode": "api_key", "env": "OPENAI_API_KEY" }
        }"#;
        let provider: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(provider.id, "openai");
        assert_eq!(provider.kind, ProviderKind::OpenaiCompat);
        assert_eq!(provider.auth.mode, AuthMode::ApiKey);
        assert_eq!(provider.auth.env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn role_config_deserializes_with_fallbacks() {
        let json = r#"{
            "model": "openai/gpt-4o",
            "require_tools": true,
            "fallbacks": [{ "model": "anthropic/claude-3-5-sonnet" }]
        }"#;
        let role: RoleConfig = serde_json::from_str(json).unwrap();
        assert_eq!(role.model, "openai/gpt-4o");
        assert!(role.require_tools);
        assert_eq!(role.fallbacks.len(), 1);
    }
}
