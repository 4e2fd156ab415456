use forge_domain::config::{Config, ConfigSeverity};

use crate::cli::ConfigFormat;

/// Parse and validate the config, printing any issues.
///
/// Exits with code 0 when valid, code 1 when errors are found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{} error(s), {} warning(s) in {config_path}", error_count, warning_count);

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) in the
/// requested format.
pub fn show(config: &Config, format: &ConfigFormat) {
    let result = match format {
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| e.to_string()),
    };

    match result {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
