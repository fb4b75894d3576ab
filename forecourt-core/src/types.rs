//! Domain types for the forecourt agent.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transfer log types
// ---------------------------------------------------------------------------

/// Lifecycle state of one watched file path.
///
/// Stored as TEXT in the transfer log; `as_str` / `parse` define the
/// canonical column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Observed and hashed; upload outcome not yet known.
    Pending,
    /// Upload acknowledged by the server with a success status.
    Sent,
    /// Upload refused or errored; retried when the path is observed again.
    Failed,
    /// Content failed validation; not uploaded until the content changes.
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the transfer log: the last known state of a watched file.
///
/// `file_path` is the natural key — re-observing a path updates the existing
/// row, it never inserts a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Bare file name, kept for display and for the upload form.
    pub file_name: String,
    /// Absolute path of the observed file.
    pub file_path: PathBuf,
    /// Lower-case hex SHA-256 of the content at the last observation.
    pub content_hash: String,
    pub status: TransferStatus,
    /// When the agent last acted on this path.
    pub last_attempt: DateTime<Utc>,
    /// Server or validator text for `Failed` / `Rejected` rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Agent configuration model
// ---------------------------------------------------------------------------

/// Remote endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the central server, e.g. `https://erp.example.com`.
    pub base_url: String,
    /// Sent as `X-Api-Key` on every request when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Sent as `X-Client-Id` on every request when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Identity of the station this agent runs at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Numeric station id; sent as `istasyonId` with uploads and heartbeats.
    pub id: i64,
    /// When set, archive exports embedding a different code are rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_code: Option<String>,
}

/// File-name shape of automation exports.
///
/// A path is a candidate when its extension starts with `automation_prefix`,
/// or equals `archive_ext`, or equals `data_ext` (all case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilter {
    #[serde(default = "default_automation_prefix")]
    pub automation_prefix: String,
    /// Extension of archive exports, without the dot.
    #[serde(default = "default_archive_ext")]
    pub archive_ext: String,
    /// Extension of plain data exports, without the dot.
    #[serde(default = "default_data_ext")]
    pub data_ext: String,
}

impl Default for ExportFilter {
    fn default() -> Self {
        Self {
            automation_prefix: default_automation_prefix(),
            archive_ext: default_archive_ext(),
            data_ext: default_data_ext(),
        }
    }
}

fn default_automation_prefix() -> String {
    "trn".to_owned()
}
fn default_archive_ext() -> String {
    "zip".to_owned()
}
fn default_data_ext() -> String {
    "xml".to_owned()
}

/// Root of `~/.forecourt/agent.yaml`.
///
/// The running daemon holds this behind an atomically-swappable `Arc`; every
/// pipeline stage works from the snapshot it was handed, so a reload never
/// mixes old and new values within one file's processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Directory watched for automation exports. Must already exist; the
    /// agent never creates it.
    pub watch_dir: PathBuf,
    pub api: ApiConfig,
    pub station: StationConfig,
    #[serde(default)]
    pub exports: ExportFilter,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Upper bound on files processed concurrently.
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

fn default_heartbeat_interval_secs() -> u64 {
    300
}
fn default_upload_concurrency() -> usize {
    4
}

impl AgentConfig {
    /// A config with everything optional left at its default.
    pub fn new(watch_dir: PathBuf, base_url: String, station_id: i64) -> Self {
        Self {
            watch_dir,
            api: ApiConfig {
                base_url,
                api_key: None,
                client_id: None,
            },
            station: StationConfig {
                id: station_id,
                expected_code: None,
            },
            exports: ExportFilter::default(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            upload_concurrency: default_upload_concurrency(),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_roundtrip() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Sent,
            TransferStatus::Failed,
            TransferStatus::Rejected,
        ] {
            let parsed = TransferStatus::parse(status.as_str()).expect("parse own as_str");
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(TransferStatus::parse("SENT"), Some(TransferStatus::Sent));
        assert_eq!(TransferStatus::parse("nonsense"), None);
    }

    #[test]
    fn record_serde_roundtrip() {
        let rec = TransferRecord {
            file_name: "shift.zip".into(),
            file_path: PathBuf::from("/exports/shift.zip"),
            content_hash: "ab".repeat(32),
            status: TransferStatus::Sent,
            last_attempt: Utc::now(),
            error_message: None,
        };
        let yaml = serde_yaml::to_string(&rec).expect("serialize");
        assert!(!yaml.contains("error_message"), "None must be omitted");
        let back: TransferRecord = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, rec);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let yaml = "\
watch_dir: /var/exports
api:
  base_url: https://erp.example.com
station:
  id: 1042
";
        let cfg: AgentConfig = serde_yaml::from_str(yaml).expect("parse minimal config");
        assert_eq!(cfg.exports.automation_prefix, "trn");
        assert_eq!(cfg.exports.archive_ext, "zip");
        assert_eq!(cfg.exports.data_ext, "xml");
        assert_eq!(cfg.heartbeat_interval_secs, 300);
        assert_eq!(cfg.upload_concurrency, 4);
        assert_eq!(cfg.station.expected_code, None);
        assert_eq!(cfg.api.api_key, None);
    }

    #[test]
    fn new_config_matches_the_serde_defaults() {
        let cfg = AgentConfig::new(
            PathBuf::from("/var/exports"),
            "https://erp.example.com".into(),
            1042,
        );
        assert_eq!(cfg.exports, ExportFilter::default());
        assert_eq!(cfg.heartbeat_interval_secs, 300);
        assert_eq!(cfg.upload_concurrency, 4);
        assert_eq!(cfg.api.api_key, None);
        assert_eq!(cfg.station.expected_code, None);
    }

    #[test]
    fn heartbeat_interval_in_seconds() {
        let mut cfg = AgentConfig::new(PathBuf::from("/x"), "http://localhost".into(), 7);
        cfg.heartbeat_interval_secs = 60;
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(60));
    }
}
