//! `forecourt agent` — transfer agent lifecycle over the control socket.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use forecourt_daemon::paths::{latest_log_path, socket_path};
use forecourt_daemon::{
    request_reload, request_scan, request_status, request_stop, start_blocking, DaemonError,
};

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// Run the agent in the foreground (watcher + workers + socket server).
    Start,
    /// Request graceful agent shutdown over the Unix socket.
    Stop,
    /// Query agent runtime status over the Unix socket.
    Status,
    /// Sweep the watch folder for backlog now.
    Scan,
    /// Re-read agent.yaml and apply it without restarting.
    Reload,
    /// Print recent agent log lines.
    Logs(AgentLogsArgs),
}

#[derive(Args, Debug)]
pub struct AgentLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,
}

pub fn run(command: AgentCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        AgentCommand::Start => {
            start_blocking(&home).context("agent exited with error")?;
        }
        AgentCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("agent stop requested"),
            Err(DaemonError::AgentNotRunning { .. }) => {
                println!("agent is not running");
            }
            Err(err) => return Err(err).context("failed to stop agent"),
        },
        AgentCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render agent status JSON")?
                );
            }
            Err(DaemonError::AgentNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render agent status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query agent status"),
        },
        AgentCommand::Scan => match request_scan(&home) {
            Ok(data) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&data)
                        .context("failed to render scan response JSON")?
                );
            }
            Err(DaemonError::AgentNotRunning { .. }) => {
                println!("agent is not running");
            }
            Err(err) => return Err(err).context("failed to request a backlog scan"),
        },
        AgentCommand::Reload => match request_reload(&home) {
            Ok(data) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&data)
                        .context("failed to render reload response JSON")?
                );
            }
            Err(DaemonError::AgentNotRunning { .. }) => {
                println!("agent is not running");
            }
            Err(err) => return Err(err).context("failed to request a config reload"),
        },
        AgentCommand::Logs(args) => match latest_log_path(&home) {
            Some(path) => print_tail(&path, args.lines).context("failed to read agent log")?,
            None => println!("no agent log files yet"),
        },
    }

    Ok(())
}

fn print_tail(path: &std::path::Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tail = VecDeque::<String>::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
