// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the `herald` operator commands.
//!
//! Each test writes a config file pointing at a temp database, runs the real
//! binary against it and checks both the output and the database.

use std::path::PathBuf;
use std::process::{Command, Output};

use herald_core::{
    BroadcastStore, ControlCommand, CredentialStore, Credentials, DeliveryRecord,
    DeliveryStatus, MessageLog,
};
use herald_storage::{Database, SqliteStorage};
use herald_test_utils::{immediate_schedule, start_time};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new(extra: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("herald.db");
        let config = dir.path().join("herald.toml");
        std::fs::write(
            &config,
            format!(
                "[engine]\nsession_name = \"default\"\n\n[storage]\ndatabase_path = \"{}\"\n{extra}",
                db.display()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn db_path(&self) -> String {
        self.dir.path().join("herald.db").to_string_lossy().to_string()
    }

    async fn storage(&self) -> SqliteStorage {
        let db = Database::open(&self.db_path()).await.unwrap();
        SqliteStorage::new(db, std::sync::Arc::new(herald_core::SystemClock))
    }

    fn herald(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_herald"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// ---- status ----

#[tokio::test]
async fn status_on_a_fresh_database_reports_no_owner() {
    let ws = Workspace::new("");
    let output = ws.herald(&["status", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["session"], "default");
    assert!(json["lease"].is_null());
    assert!(json["connection"].is_null());
}

// ---- trigger ----

#[tokio::test]
async fn trigger_queues_a_request_for_a_known_schedule() {
    let ws = Workspace::new("");
    let storage = ws.storage().await;
    storage
        .upsert_schedule(&immediate_schedule("morning", &["wire"], &["newsroom"]))
        .await
        .unwrap();

    let output = ws.herald(&["trigger", "morning"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("schedule `morning`"));

    let claimed = storage.claim_triggers().await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].schedule_id, "morning");
}

#[tokio::test]
async fn trigger_rejects_unknown_schedules() {
    let ws = Workspace::new("");
    let output = ws.herald(&["trigger", "nope"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));
}

// ---- log ----

#[tokio::test]
async fn log_filters_by_status() {
    let ws = Workspace::new("");
    let storage = ws.storage().await;
    for (item, status) in [("a", DeliveryStatus::Sent), ("b", DeliveryStatus::Skipped)] {
        storage
            .append(&DeliveryRecord {
                feed_item_id: item.into(),
                target_id: "newsroom".into(),
                schedule_id: "morning".into(),
                status,
                error: None,
                sent_at: (status == DeliveryStatus::Sent).then(start_time),
            })
            .await
            .unwrap();
    }

    let output = ws.herald(&["log", "--status", "skipped", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["feed_item_id"], "b");
    assert_eq!(rows[0]["status"], "skipped");
}

#[tokio::test]
async fn log_rejects_unknown_status() {
    let ws = Workspace::new("");
    let output = ws.herald(&["log", "--status", "bounced"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown status"));
}

// ---- logout / reset ----

#[tokio::test]
async fn logout_clears_credentials_and_queues_the_command() {
    let ws = Workspace::new("");
    let storage = ws.storage().await;
    storage
        .save("default", &Credentials::new("paired"))
        .await
        .unwrap();

    let output = ws.herald(&["logout"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    assert!(storage.load("default").await.unwrap().is_none());
    let controls = storage.claim_controls("default").await.unwrap();
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].command, ControlCommand::Logout);
}

#[tokio::test]
async fn reset_queues_the_command() {
    let ws = Workspace::new("");
    let output = ws.herald(&["reset"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let controls = ws.storage().await.claim_controls("default").await.unwrap();
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].command, ControlCommand::Reset);
}

// ---- configuration and serve ----

#[tokio::test]
async fn config_typos_are_reported_before_anything_runs() {
    let ws = Workspace::new("\n[lease]\nttl_sec = 30\n");
    let output = ws.herald(&["status"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown configuration key"));
}

#[tokio::test]
async fn serve_without_a_transport_refuses_to_start() {
    let ws = Workspace::new("");
    let output = ws.herald(&["serve"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--dry-run"));
}
