//! `forecourt verify` — one-shot reachability check against the central server.

use anyhow::{Context, Result};

use forecourt_core::{config, ConfigError};
use forecourt_sync::ApiClient;

pub fn run() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    let agent_config = match config::load_at(&home) {
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

    let station_id = agent_config.station.id;
    let base_url = agent_config.api.base_url.clone();
    let client = ApiClient::from_config(&agent_config).context("failed to build the API client")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    match runtime.block_on(client.verify()) {
        Ok(()) => println!("✓ Station {station_id} verified against {base_url}"),
        Err(err) => anyhow::bail!("verification failed: {err}"),
    }
    Ok(())
}
