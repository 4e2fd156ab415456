use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability (structured logging) configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Logging configuration consumed by `tracing_subscriber`'s `EnvFilter`
/// and formatting layer at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Output format for log lines.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Default filter directive passed to `EnvFilter`, overridden by the
    /// `RUST_LOG` environment variable when it is set.
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: d_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Line-oriented human-readable output, for local runs.
    #[default]
    Pretty,
    /// Newline-delimited JSON, for ingestion by a log pipeline.
    Json,
}

fn d_log_level() -> String {
    "info".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_pretty_info() {
        let cfg = ObservabilityConfig::default();
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn deserialize_json_format() {
        let cfg: ObservabilityConfig = toml::from_str(
            r#"
            log_format = "json"
            log_level = "debug"
        "#,
        )
        .unwrap();
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.log_level, "debug");
    }
}
