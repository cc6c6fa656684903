// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald trigger`, `herald logout` and `herald reset`.
//!
//! These only write to the shared database. Whichever worker holds the lease
//! picks the request up on its next tick.

use herald_config::HeraldConfig;
use herald_core::{BroadcastStore, ControlCommand, CredentialStore, HeraldError};
use herald_storage::SqliteStorage;

pub async fn run_trigger(config: &HeraldConfig, schedule_id: &str) -> Result<(), HeraldError> {
    let storage = SqliteStorage::open(&config.storage).await?;
    let request_id = queue_trigger(&storage, schedule_id).await?;
    println!("queued trigger #{request_id} for schedule `{schedule_id}`");
    Ok(())
}

async fn queue_trigger(storage: &SqliteStorage, schedule_id: &str) -> Result<i64, HeraldError> {
    if storage.get_schedule(schedule_id).await?.is_none() {
        return Err(HeraldError::invalid(
            "schedule",
            format!("`{schedule_id}` does not exist"),
        ));
    }
    storage.enqueue_trigger(schedule_id).await
}

pub async fn run_logout(config: &HeraldConfig) -> Result<(), HeraldError> {
    let storage = SqliteStorage::open(&config.storage).await?;
    let session = config.engine.session_name.as_str();
    // Credentials go now; the holder drops its connection and lease on its
    // next tick.
    storage.clear(session).await?;
    storage.enqueue_control(session, ControlCommand::Logout).await?;
    println!("logged out session `{session}`; the next start will need pairing");
    Ok(())
}

pub async fn run_reset(config: &HeraldConfig) -> Result<(), HeraldError> {
    let storage = SqliteStorage::open(&config.storage).await?;
    let session = config.engine.session_name.as_str();
    storage.enqueue_control(session, ControlCommand::Reset).await?;
    println!("queued reset for session `{session}`");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Schedule, ScheduleMode};

    async fn storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HeraldConfig::default();
        config.storage.database_path = dir.path().join("c.db").to_string_lossy().to_string();
        (SqliteStorage::open(&config.storage).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn unknown_schedules_cannot_be_triggered() {
        let (storage, _dir) = storage().await;
        let err = queue_trigger(&storage, "nope").await.unwrap_err();
        assert!(matches!(err, HeraldError::ConfigInvalid { .. }));
        assert!(storage.claim_triggers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn known_schedules_are_queued() {
        let (storage, _dir) = storage().await;
        storage
            .upsert_schedule(&Schedule {
                id: "morning".into(),
                name: "Morning".into(),
                mode: ScheduleMode::Times,
                interval_minutes: None,
                times: vec!["09:00".into()],
                timezone: "UTC".into(),
                feed_ids: vec!["wire".into()],
                target_ids: vec!["newsroom".into()],
                template_id: "plain".into(),
                enabled: true,
                last_run_at: None,
            })
            .await
            .unwrap();

        queue_trigger(&storage, "morning").await.unwrap();
        let claimed = storage.claim_triggers().await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].schedule_id, "morning");
    }
}
