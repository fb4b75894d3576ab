use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::Utc;
use predicates::prelude::*;
use predicates::str::contains;

use forecourt_core::{config, TransferRecord, TransferStatus};
use forecourt_daemon::paths::db_path;
use forecourt_sync::TransferLog;
use tempfile::TempDir;

fn forecourt_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("forecourt"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn init_station(home: &TempDir, exports: &TempDir) {
    forecourt_cmd(home.path())
        .args([
            "init",
            "--watch-dir",
            &exports.path().display().to_string(),
            "--api-url",
            "https://erp.example.com",
            "--station-id",
            "1042",
            "--api-key",
            "super-secret",
        ])
        .assert()
        .success()
        .stdout(contains("✓ Configured station 1042"));
}

#[test]
fn init_writes_config_and_show_redacts_the_key() {
    let home = TempDir::new().expect("home");
    let exports = TempDir::new().expect("exports");
    init_station(&home, &exports);

    let loaded = config::load_at(home.path()).expect("load config the CLI wrote");
    assert_eq!(loaded.station.id, 1042);
    assert_eq!(loaded.api.api_key.as_deref(), Some("super-secret"));

    forecourt_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("station"))
        .stdout(contains("<redacted>"))
        .stdout(contains("super-secret").not());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let home = TempDir::new().expect("home");
    let exports = TempDir::new().expect("exports");
    init_station(&home, &exports);

    forecourt_cmd(home.path())
        .args([
            "init",
            "--watch-dir",
            &exports.path().display().to_string(),
            "--api-url",
            "https://other.example.com",
            "--station-id",
            "7",
        ])
        .assert()
        .failure()
        .stderr(contains("already exists"));

    forecourt_cmd(home.path())
        .args([
            "init",
            "--force",
            "--watch-dir",
            &exports.path().display().to_string(),
            "--api-url",
            "https://other.example.com",
            "--station-id",
            "7",
        ])
        .assert()
        .success();

    let loaded = config::load_at(home.path()).expect("load config after --force");
    assert_eq!(loaded.station.id, 7);
}

#[test]
fn agent_status_reports_not_running_without_a_socket() {
    let home = TempDir::new().expect("home");

    let assert = forecourt_cmd(home.path())
        .args(["agent", "status"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let payload: serde_json::Value = serde_json::from_str(&stdout).expect("status JSON");
    assert_eq!(payload["running"], serde_json::json!(false));
}

#[test]
fn transfers_without_a_database_is_a_friendly_no_op() {
    let home = TempDir::new().expect("home");

    forecourt_cmd(home.path())
        .args(["transfers"])
        .assert()
        .success()
        .stdout(contains("no transfers recorded yet"));

    assert!(
        !db_path(home.path()).exists(),
        "listing transfers must not create the database"
    );
}

#[test]
fn transfers_json_lists_seeded_rows_newest_first() {
    let home = TempDir::new().expect("home");
    let exports = home.path().join("exports");
    fs::create_dir_all(&exports).expect("exports dir");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let log = TransferLog::open(db_path(home.path())).await.expect("open log");
        log.upsert(&TransferRecord {
            file_name: "20260825_vardiya.zip".into(),
            file_path: exports.join("20260825_vardiya.zip"),
            content_hash: "ab".repeat(32),
            status: TransferStatus::Sent,
            last_attempt: Utc::now() - chrono::Duration::minutes(5),
            error_message: None,
        })
        .await
        .expect("seed sent row");
        log.upsert(&TransferRecord {
            file_name: "pump02.trn001".into(),
            file_path: exports.join("pump02.trn001"),
            content_hash: "cd".repeat(32),
            status: TransferStatus::Failed,
            last_attempt: Utc::now(),
            error_message: Some("db unavailable".into()),
        })
        .await
        .expect("seed failed row");
        log.close().await;
    });

    let assert = forecourt_cmd(home.path())
        .args(["transfers", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let payload: serde_json::Value = serde_json::from_str(&stdout).expect("transfers JSON");

    assert_eq!(payload["summary"]["sent"], serde_json::json!(1));
    assert_eq!(payload["summary"]["failed"], serde_json::json!(1));
    let transfers = payload["transfers"].as_array().expect("transfers array");
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0]["file_name"], "pump02.trn001");
    assert_eq!(transfers[0]["error_message"], "db unavailable");
    assert_eq!(transfers[1]["file_name"], "20260825_vardiya.zip");
}

#[test]
fn verify_without_config_points_at_init() {
    let home = TempDir::new().expect("home");

    forecourt_cmd(home.path())
        .args(["verify"])
        .assert()
        .success()
        .stdout(contains("run `forecourt init` first"));
}
