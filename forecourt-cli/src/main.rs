//! Forecourt — fuel-station export transfer agent CLI.
//!
//! # Usage
//!
//! ```text
//! forecourt init --watch-dir <path> --api-url <url> --station-id <id>
//!               [--api-key <key>] [--client-id <id>] [--expected-code <code>] [--force]
//! forecourt config show [--json]
//! forecourt agent start|stop|status|scan|reload|logs
//! forecourt transfers [--limit <n>] [--json]
//! forecourt verify
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    agent::AgentCommand, config::ConfigCommand, init::InitArgs, transfers::TransfersArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "forecourt",
    version,
    about = "Ship fuel-station automation exports to the central server",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the agent configuration for this machine.
    Init(InitArgs),

    /// Inspect the agent configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run and control the background transfer agent.
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Show recent rows of the transfer log.
    Transfers(TransfersArgs),

    /// One-shot reachability check against the central server.
    Verify,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Agent { command } => commands::agent::run(command),
        Commands::Transfers(args) => args.run(),
        Commands::Verify => commands::verify::run(),
    }
}
