pub mod config;
pub mod doctor;
pub mod run;

use clap::{Parser, Subcommand};

/// forge — a small demonstration CLI for the plan/execute engine.
#[derive(Debug, Parser)]
#[command(name = "forge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a PlanIR and execute it against an in-memory Store/ContextStore.
    Run {
        /// Path to a PlanIR JSON file.
        #[arg(long)]
        plan: String,
        /// Chat id the plan's contexts are committed under.
        #[arg(long, default_value = "cli")]
        chat_id: String,
    },
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML, JSON, or YAML.
    Show {
        #[arg(long, default_value = "toml")]
        format: ConfigFormat,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `FORGE_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used.
///
/// This is shared by `run`, `doctor`, and `config` subcommands so the
/// logic lives in one place.
pub fn load_config() -> anyhow::Result<(forge_domain::config::Config, String)> {
    let config_path = std::env::var("FORGE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        forge_domain::config::Config::default()
    };

    Ok((config, config_path))
}
