//! `forecourt config show` — inspect the active configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use forecourt_core::{config, ConfigError};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the loaded configuration with the API key redacted.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Emit machine-readable JSON instead of YAML.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show(args) => show(args),
    }
}

fn show(args: ShowArgs) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    let mut agent_config = match config::load_at(&home) {
        Ok(config) => config,
        Err(ConfigError::ConfigNotFound { path }) => {
            println!(
                "no configuration at {}; run `forecourt init` first",
                path.display()
            );
            return Ok(());
        }
        Err(err) => return Err(err).context("failed to load agent configuration"),
    };

    // The key never leaves the config file; show presence only.
    if agent_config.api.api_key.is_some() {
        agent_config.api.api_key = Some("<redacted>".into());
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&agent_config)
                .context("failed to render configuration JSON")?
        );
        return Ok(());
    }

    println!("# {}", config::config_path_at(&home).display());
    print!(
        "{}",
        serde_yaml::to_string(&agent_config).context("failed to render configuration YAML")?
    );
    Ok(())
}
