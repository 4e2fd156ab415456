mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Run { plan, chat_id }) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            cli::run::run(&config, &plan, &chat_id).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &config_path);
            if passed {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            let ok = cli::config::validate(&config, &config_path);
            if ok {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        Some(Command::Config(ConfigCommand::Show { format })) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config, &format);
            Ok(())
        }
        Some(Command::Version) | None => {
            println!("forge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
