use forge_domain::config::{Config, ConfigSeverity};

#[test]
fn default_config_validates_with_only_a_warning() {
    let config = Config::default();
    let issues = config.validate();
    assert!(issues
        .iter()
        .all(|issue| issue.severity == ConfigSeverity::Warning));
}

#[test]
fn default_worker_pool_target_size_is_four() {
    let config = Config::default();
    assert_eq!(config.worker_pool.target_size, 4);
}

#[test]
fn explicit_provider_list_parses() {
    let toml_str = r#"
[[llm.providers]]
id = "openai"
kind = "openai_compat"
base_url = "https://api.openai.com/v1"

[llm.providers.auth]
mode = "api_key"
env = "OPENAI_API_KEY"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.llm.providers.len(), 1);
    assert_eq!(config.llm.providers[0].id, "openai");
    assert!(config.validate().is_empty());
}
