//! `forecourt init --watch-dir <path> --api-url <url> --station-id <id> [...]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use forecourt_core::{config, AgentConfig};

/// Write the agent configuration for this machine.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Folder the station automation drops export files into.
    #[arg(long, short = 'w')]
    pub watch_dir: PathBuf,

    /// Base URL of the central server (e.g. "https://erp.example.com").
    #[arg(long, short = 'u')]
    pub api_url: String,

    /// Numeric station id assigned by the central server.
    #[arg(long, short = 's')]
    pub station_id: i64,

    /// Shared secret sent as X-Api-Key on every request.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Client identifier sent as X-Client-Id on every request.
    #[arg(long)]
    pub client_id: Option<String>,

    /// Station code archive exports must embed; mismatches are rejected.
    #[arg(long)]
    pub expected_code: Option<String>,

    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        let path = config::config_path_at(&home);
        if path.exists() && !self.force {
            anyhow::bail!(
                "config already exists at {}; pass --force to overwrite",
                path.display()
            );
        }

        // Canonicalize when possible so the watcher and the config agree on
        // one spelling of the path. A folder that does not exist yet is kept
        // as given; the agent checks again at startup.
        let watch_dir = self
            .watch_dir
            .canonicalize()
            .unwrap_or(self.watch_dir);
        let watch_dir_missing = !watch_dir.is_dir();

        let mut agent_config = AgentConfig::new(watch_dir, self.api_url, self.station_id);
        agent_config.api.api_key = self.api_key;
        agent_config.api.client_id = self.client_id;
        agent_config.station.expected_code = self.expected_code;

        config::save_at(&home, &agent_config)
            .with_context(|| format!("failed to write {}", path.display()))?;

        println!(
            "✓ Configured station {} watching {}",
            agent_config.station.id,
            agent_config.watch_dir.display()
        );
        println!("  Saved to: {}", path.display());
        if watch_dir_missing {
            println!(
                "  warning: watch folder does not exist yet; `forecourt agent start` will refuse until it does"
            );
        }
        Ok(())
    }
}
