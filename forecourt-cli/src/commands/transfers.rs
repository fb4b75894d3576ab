//! `forecourt transfers` — recent transfer log rows and per-status totals.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use forecourt_core::{TransferRecord, TransferStatus};
use forecourt_daemon::paths::db_path;
use forecourt_sync::{StatusCounts, SyncError, TransferLog};

/// Arguments for `forecourt transfers`.
#[derive(Args, Debug)]
pub struct TransfersArgs {
    /// Number of rows to show, newest first.
    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl TransfersArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        // Opening the pool would create an empty database; a missing file
        // just means the agent has never processed anything here.
        let db = db_path(&home);
        if !db.exists() {
            println!("no transfers recorded yet ({} is missing)", db.display());
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let (records, counts) = runtime
            .block_on(async {
                let log = TransferLog::open(&db).await?;
                let records = log.recent(self.limit).await?;
                let counts = log.status_counts().await?;
                log.close().await;
                Ok::<_, SyncError>((records, counts))
            })
            .context("failed to read the transfer log")?;

        if self.json {
            print_json(records, counts)?;
            return Ok(());
        }

        print_table(records, counts);
        Ok(())
    }
}

#[derive(Serialize)]
struct TransfersJson {
    summary: StatusCounts,
    transfers: Vec<TransferRecord>,
}

#[derive(Tabled)]
struct TransferTableRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last attempt")]
    last_attempt: String,
    #[tabled(rename = "sha-256")]
    digest: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_json(records: Vec<TransferRecord>, counts: StatusCounts) -> Result<()> {
    let payload = TransfersJson {
        summary: counts,
        transfers: records,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize transfers JSON")?
    );
    Ok(())
}

fn print_table(records: Vec<TransferRecord>, counts: StatusCounts) {
    println!(
        "Forecourt v{} | {} sent | {} failed | {} rejected | {} pending",
        env!("CARGO_PKG_VERSION"),
        counts.sent,
        counts.failed,
        counts.rejected,
        counts.pending,
    );

    if records.is_empty() {
        println!("No transfers recorded.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    println!(
        "Indicators: {} SENT  {} FAILED  {} REJECTED  {} PENDING",
        status_indicator(TransferStatus::Sent),
        status_indicator(TransferStatus::Failed),
        status_indicator(TransferStatus::Rejected),
        status_indicator(TransferStatus::Pending),
    );
    println!("{separator}");

    let rows: Vec<TransferTableRow> = records
        .into_iter()
        .map(|record| TransferTableRow {
            file: record.file_name,
            status: status_label(record.status).to_string(),
            last_attempt: format_local(record.last_attempt),
            digest: short_digest(&record.content_hash),
            detail: record.error_message.unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{separator}");
}

fn status_label(status: TransferStatus) -> &'static str {
    match status {
        TransferStatus::Pending => "PENDING",
        TransferStatus::Sent => "SENT",
        TransferStatus::Failed => "FAILED",
        TransferStatus::Rejected => "REJECTED",
    }
}

fn status_indicator(status: TransferStatus) -> String {
    match status {
        TransferStatus::Pending => "■".bright_black().bold().to_string(),
        TransferStatus::Sent => "■".green().bold().to_string(),
        TransferStatus::Failed => "■".red().bold().to_string(),
        TransferStatus::Rejected => "■".yellow().bold().to_string(),
    }
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn short_digest(hash: &str) -> String {
    hash.chars().take(12).collect()
}
